//! Role-aware system prompt and greeting text

use crate::tools::{SessionRole, UserContext};
use crate::voice::LanguageProfile;

const BASE_PROMPT: &str = "You are Harvest, the assistant of a farm-produce marketplace that \
connects farmers with buyers. Keep answers short and conversational: they are often read \
aloud. Use the provided tools for anything involving products, orders, weather or farming \
advice instead of guessing. When a tool reports a failure, explain it plainly and suggest \
what the user can do next.";

/// Capabilities the prompt advertises for a role
const fn capabilities(role: Option<SessionRole>) -> &'static str {
    match role {
        Some(SessionRole::Farmer) => {
            "The user is a farmer. You can list new produce, change price or stock of their \
             products, remove products, show the orders they have received, and give farming \
             tips and weather forecasts."
        }
        Some(SessionRole::Buyer) => {
            "The user is a buyer. You can search the catalog, place orders, track existing \
             orders, and share weather forecasts."
        }
        None => {
            "The user is not signed in. You can search the catalog and share weather forecasts \
             and farming tips. Ask them to sign in as a farmer or buyer before selling or \
             ordering."
        }
    }
}

/// Build the system prompt for the current user and language
#[must_use]
pub fn system_prompt(user: &UserContext, language: &LanguageProfile) -> String {
    let mut prompt = format!("{BASE_PROMPT}\n\n{}", capabilities(user.role));

    if let Some(name) = user.display_name() {
        prompt.push_str(&format!("\nThe user's name is {name}."));
    }

    prompt.push_str(&format!(
        "\nAlways reply in {} ({}), using plain sentences without markdown tables.",
        language.name, language.code
    ));
    prompt
}

/// Opening assistant message for a fresh conversation
#[must_use]
pub fn greeting(user: &UserContext) -> String {
    let salutation = user
        .display_name()
        .map_or_else(|| "Hello!".to_string(), |name| format!("Hello {name}!"));

    let offer = match user.role {
        Some(SessionRole::Farmer) => {
            "I can list your produce, update prices and stock, show your orders, or share farming tips and the weather."
        }
        Some(SessionRole::Buyer) => {
            "I can help you find fresh produce, place an order, or track a delivery."
        }
        None => "I can help you browse fresh produce, check the weather, or get farming tips.",
    };

    format!("{salutation} {offer} What would you like to do?")
}
