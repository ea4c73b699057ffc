use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use harvest_assistant::conversation::Role;
use harvest_assistant::llm::OpenAiChat;
use harvest_assistant::tools::{HttpMarketplace, OpenMeteoAdvisory, marketplace_registry};
use harvest_assistant::voice::{
    AudioSink, CpalMicrophone, CpalPlayback, Microphone, synthesizer_from_config,
    transcriber_from_config,
};
use harvest_assistant::{
    Collaborators, Config, Message, Session, SessionRole, SessionSettings, UserContext,
};

/// Harvest - voice and text assistant for the farm marketplace
#[derive(Parser)]
#[command(name = "harvest", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Marketplace role of the user ("farmer" or "buyer"); omit for guest
    #[arg(long, env = "HARVEST_ROLE")]
    role: Option<SessionRole>,

    /// User's display name
    #[arg(long, env = "HARVEST_USER_NAME")]
    name: Option<String>,

    /// Marketplace user id passed to tools
    #[arg(long, env = "HARVEST_USER_ID")]
    user_id: Option<String>,

    /// Reply language code (en, hi, mr, ta, te)
    #[arg(long)]
    lang: Option<String>,

    /// Don't speak replies
    #[arg(long)]
    no_speech: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with the assistant (default)
    Chat,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,harvest_assistant=info",
        1 => "info,harvest_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(lang) = &cli.lang {
        config.language.clone_from(lang);
    }
    if cli.no_speech {
        config.speech.enabled = false;
    }

    let mut user = UserContext::new(cli.name, cli.role);
    if let Some(id) = cli.user_id {
        user = user.with_user_id(id);
    }

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => chat(&config, user).await,
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestTts { text } => test_tts(&config, &text).await,
    }
}

/// Build a session from configuration
fn build_session(config: &Config, user: UserContext) -> anyhow::Result<Session> {
    let completion = Arc::new(OpenAiChat::new(config.api_keys.openai.clone(), &config.llm)?);
    let transcriber = transcriber_from_config(&config.transcription, &config.api_keys)?;

    let synthesizer = if config.speech.enabled {
        match synthesizer_from_config(&config.speech, &config.api_keys) {
            Ok(synthesizer) => Some(synthesizer),
            Err(e) => {
                tracing::warn!(error = %e, "speech disabled");
                None
            }
        }
    } else {
        None
    };
    let sink: Option<Arc<dyn AudioSink>> = synthesizer
        .as_ref()
        .map(|_| Arc::new(CpalPlayback::new()) as Arc<dyn AudioSink>);

    let marketplace = HttpMarketplace::new(&config.marketplace, config.api_keys.marketplace.clone())?;
    let advisory = OpenMeteoAdvisory::new(config.marketplace.timeout)?;

    let collaborators = Collaborators {
        completion,
        transcriber,
        synthesizer,
        sink,
        microphone: Arc::new(CpalMicrophone::new()),
        tools: marketplace_registry(Arc::new(marketplace), Arc::new(advisory)),
    };

    Ok(Session::open(
        collaborators,
        SessionSettings::from_config(config, user),
    ))
}

/// Interactive text REPL
async fn chat(config: &Config, user: UserContext) -> anyhow::Result<()> {
    let session = Arc::new(build_session(config, user)?);
    let mut printed = print_new(&session, 0);

    println!("(type a message, /voice to speak, /lang <code>, /stop to silence, /quit to exit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            ("/quit" | "/exit", _) => break,
            ("/stop", _) => session.stop_speaking(),
            ("/lang", code) if !code.is_empty() => {
                session.set_language(config.language_profile(code));
                println!("(language: {})", session.language().name);
            }
            ("/voice", _) => {
                println!("(listening, press Enter to stop)");
                let recording = tokio::spawn({
                    let session = Arc::clone(&session);
                    async move { session.record().await }
                });
                tokio::pin!(recording);

                let outcome = tokio::select! {
                    outcome = &mut recording => outcome?,
                    _ = lines.next_line() => {
                        session.stop_recording();
                        recording.await?
                    }
                };
                tracing::debug!(?outcome, "recording finished");
            }
            _ => {
                let outcome = session.submit_user_input(line).await;
                tracing::debug!(?outcome, "turn finished");
            }
        }
        printed = print_new(&session, printed);
    }

    session.close();
    Ok(())
}

/// Print permanent messages after `from`; returns the new count
fn print_new(session: &Session, from: usize) -> usize {
    let messages: Vec<Message> = session
        .messages()
        .into_iter()
        .filter(|m| !m.is_ephemeral())
        .collect();

    for message in messages.iter().skip(from) {
        match (message.role(), message.content()) {
            (Some(Role::User), Some(text)) => println!("you> {text}"),
            (Some(Role::Assistant), Some(text)) => println!("harvest> {text}"),
            _ => {}
        }
    }
    messages.len()
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let capture = CpalMicrophone::new().open().await?;
    tokio::time::sleep(Duration::from_secs(duration)).await;
    let wav = tokio::task::spawn_blocking(move || capture.finish()).await??;

    let reader = hound::WavReader::new(std::io::Cursor::new(wav))?;
    let sample_rate = reader.spec().sample_rate;
    let samples: Vec<i16> = reader.into_samples().collect::<Result<_, _>>()?;
    let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);

    println!("Sample rate: {sample_rate} Hz");
    println!("Captured {} samples, peak {peak}", samples.len());
    println!("\n---");
    if peak < 100 {
        println!("Input looks silent. Check that your mic is plugged in and unmuted.");
    } else {
        println!("Your mic is working!");
    }

    Ok(())
}

/// Test TTS output
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let synthesizer = synthesizer_from_config(&config.speech, &config.api_keys)?;
    let voice = config
        .speech
        .voice_override
        .clone()
        .unwrap_or_else(|| config.language_profile(&config.language).voice_id);

    println!("Synthesizing speech...");
    let mp3_data = synthesizer.synthesize(text, &voice).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing...");
    CpalPlayback::new().play(mp3_data).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
