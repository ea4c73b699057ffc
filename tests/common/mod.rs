//! Shared test utilities: fake collaborators and a session harness

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use harvest_assistant::llm::{Completion, CompletionClient, CompletionRequest};
use harvest_assistant::tools::marketplace::{
    NewProduct, Order, OrderRequest, Product, ProductQuery, ProductUpdate,
};
use harvest_assistant::tools::{
    AdvisoryService, MarketplaceService, Outcome, Season, ToolRegistry, marketplace_registry,
};
use harvest_assistant::tools::advisory::Forecast;
use harvest_assistant::voice::{
    AudioSink, CaptureSession, LanguageProfile, Microphone, Synthesizer, TranscriptionProvider,
};
use harvest_assistant::{Collaborators, Error, Result, Session, SessionSettings};

/// Completion client replaying a script, recording every request
#[derive(Default)]
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<Completion>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
    /// When set, each call waits for a notification before answering
    pub gate: Option<Arc<Notify>>,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<Result<Completion>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn gated(script: Vec<Result<Completion>>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(script)
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> CompletionRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.requests.lock().unwrap().push(request);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Completion("script exhausted".to_string())))
    }
}

/// One transcription request seen by the fake
#[derive(Debug, Clone)]
pub struct TranscriptionCall {
    pub audio: Vec<u8>,
    pub language: String,
    pub at: Instant,
}

/// Transcriber answering from a queue; blank once the queue is empty
#[derive(Default)]
pub struct FakeTranscriber {
    replies: Mutex<VecDeque<Result<String>>>,
    pub calls: Mutex<Vec<TranscriptionCall>>,
}

impl FakeTranscriber {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<TranscriptionCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptionProvider for FakeTranscriber {
    async fn transcribe(&self, audio: &[u8], language: &LanguageProfile) -> Result<String> {
        self.calls.lock().unwrap().push(TranscriptionCall {
            audio: audio.to_vec(),
            language: language.code.clone(),
            at: Instant::now(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Microphone whose n-th capture yields `[n; 4]`
#[derive(Default)]
pub struct FakeMicrophone {
    opened: AtomicUsize,
    pub discarded: Arc<AtomicUsize>,
    pub deny: bool,
}

impl FakeMicrophone {
    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Microphone for FakeMicrophone {
    async fn open(&self) -> Result<Box<dyn CaptureSession>> {
        if self.deny {
            return Err(Error::Permission("access denied".to_string()));
        }
        let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(FakeCapture {
            audio: Some(vec![u8::try_from(n).unwrap(); 4]),
            discarded: Arc::clone(&self.discarded),
        }))
    }
}

struct FakeCapture {
    audio: Option<Vec<u8>>,
    discarded: Arc<AtomicUsize>,
}

impl CaptureSession for FakeCapture {
    fn finish(mut self: Box<Self>) -> Result<Vec<u8>> {
        Ok(self.audio.take().unwrap_or_default())
    }
}

impl Drop for FakeCapture {
    fn drop(&mut self) {
        if self.audio.is_some() {
            self.discarded.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Synthesizer echoing the text as bytes
#[derive(Default)]
pub struct FakeSynthesizer {
    pub spoken: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl FakeSynthesizer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<(String, String)> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_string(), voice.to_string()));
        if self.fail {
            return Err(Error::Synthesis("service unavailable".to_string()));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Sink that plays instantly, or holds until released when `hold` is set
#[derive(Default)]
pub struct FakeSink {
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
    pub interrupted: Arc<AtomicUsize>,
    pub hold: bool,
}

impl FakeSink {
    pub fn holding() -> Self {
        Self {
            hold: true,
            ..Self::default()
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn interrupted(&self) -> usize {
        self.interrupted.load(Ordering::SeqCst)
    }
}

struct CountOnDrop {
    counter: Arc<AtomicUsize>,
    armed: bool,
}

impl Drop for CountOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&self, _audio: Vec<u8>) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let mut guard = CountOnDrop {
            counter: Arc::clone(&self.interrupted),
            armed: true,
        };
        if self.hold {
            std::future::pending::<()>().await;
        }
        guard.armed = false;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Marketplace recording the calls that reach it
#[derive(Default)]
pub struct FakeMarketplace {
    pub calls: Mutex<Vec<String>>,
    /// When set, `add_product` waits for a notification after recording the call
    pub gate: Option<Arc<Notify>>,
}

impl FakeMarketplace {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

pub fn product(name: &str, price: f64, quantity: f64) -> Product {
    Product {
        id: format!("p-{name}"),
        name: name.to_string(),
        category: Some("vegetables".to_string()),
        price_per_unit: price,
        unit: "kg".to_string(),
        quantity,
        farmer_id: Some("farmer-1".to_string()),
        farmer_name: Some("Ramesh".to_string()),
        description: None,
    }
}

#[async_trait]
impl MarketplaceService for FakeMarketplace {
    async fn add_product(&self, farmer_id: &str, new: NewProduct) -> Result<Outcome<Product>> {
        self.record(&format!("add_product:{farmer_id}:{}", new.name));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(Outcome::Accepted(product(&new.name, new.price_per_unit, new.quantity)))
    }

    async fn update_product(
        &self,
        _farmer_id: &str,
        product_id: &str,
        _update: ProductUpdate,
    ) -> Result<Outcome<Product>> {
        self.record(&format!("update_product:{product_id}"));
        Ok(Outcome::Rejected("product not found".to_string()))
    }

    async fn delete_product(&self, _farmer_id: &str, product_id: &str) -> Result<Outcome<()>> {
        self.record(&format!("delete_product:{product_id}"));
        Ok(Outcome::Accepted(()))
    }

    async fn farmer_orders(&self, farmer_id: &str, _status: Option<&str>) -> Result<Vec<Order>> {
        self.record(&format!("farmer_orders:{farmer_id}"));
        Ok(Vec::new())
    }

    async fn search_products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        self.record(&format!("search_products:{}", query.query.clone().unwrap_or_default()));
        Err(Error::Tool("catalog offline".to_string()))
    }

    async fn place_order(&self, buyer_id: &str, order: OrderRequest) -> Result<Outcome<Order>> {
        self.record(&format!("place_order:{buyer_id}:{}", order.product_id));
        Ok(Outcome::Rejected("out of stock".to_string()))
    }

    async fn track_order(&self, _buyer_id: &str, order_id: &str) -> Result<Outcome<Order>> {
        self.record(&format!("track_order:{order_id}"));
        Ok(Outcome::Rejected("order not found".to_string()))
    }
}

/// Advisory answering from fixed data
#[derive(Default)]
pub struct FakeAdvisory;

#[async_trait]
impl AdvisoryService for FakeAdvisory {
    async fn farming_tips(&self, crop: Option<&str>, _season: Season) -> Result<Vec<String>> {
        Ok(vec![format!("Water {} early in the morning.", crop.unwrap_or("crops"))])
    }

    async fn weather_forecast(&self, location: &str, _days: u8) -> Result<Outcome<Forecast>> {
        Ok(Outcome::Rejected(format!("unknown location: {location}")))
    }
}

/// Fakes for every collaborator, kept so tests can inspect them
pub struct Harness {
    pub completion: Arc<ScriptedCompletion>,
    pub transcriber: Arc<FakeTranscriber>,
    pub microphone: Arc<FakeMicrophone>,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub sink: Arc<FakeSink>,
    pub marketplace: Arc<FakeMarketplace>,
}

impl Harness {
    pub fn new(completion: ScriptedCompletion) -> Self {
        Self {
            completion: Arc::new(completion),
            transcriber: Arc::new(FakeTranscriber::default()),
            microphone: Arc::new(FakeMicrophone::default()),
            synthesizer: Arc::new(FakeSynthesizer::default()),
            sink: Arc::new(FakeSink::default()),
            marketplace: Arc::new(FakeMarketplace::default()),
        }
    }

    pub fn with_transcriber(mut self, transcriber: FakeTranscriber) -> Self {
        self.transcriber = Arc::new(transcriber);
        self
    }

    pub fn with_microphone(mut self, microphone: FakeMicrophone) -> Self {
        self.microphone = Arc::new(microphone);
        self
    }

    pub fn with_marketplace(mut self, marketplace: FakeMarketplace) -> Self {
        self.marketplace = Arc::new(marketplace);
        self
    }

    pub fn with_sink(mut self, sink: FakeSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: FakeSynthesizer) -> Self {
        self.synthesizer = Arc::new(synthesizer);
        self
    }

    pub fn tools(&self) -> ToolRegistry {
        marketplace_registry(
            Arc::clone(&self.marketplace) as Arc<dyn MarketplaceService>,
            Arc::new(FakeAdvisory),
        )
    }

    pub fn session(&self, settings: SessionSettings) -> Session {
        Session::open(
            Collaborators {
                completion: Arc::clone(&self.completion) as Arc<dyn CompletionClient>,
                transcriber: Arc::clone(&self.transcriber) as Arc<dyn TranscriptionProvider>,
                synthesizer: Some(Arc::clone(&self.synthesizer) as Arc<dyn Synthesizer>),
                sink: Some(Arc::clone(&self.sink) as Arc<dyn AudioSink>),
                microphone: Arc::clone(&self.microphone) as Arc<dyn Microphone>,
                tools: self.tools(),
            },
            settings,
        )
    }
}
