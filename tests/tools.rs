//! Marketplace tool registry tests against fake services

use serde_json::{Value, json};

use harvest_assistant::conversation::ToolCall;
use harvest_assistant::tools::{ToolContext, ToolRegistry};
use harvest_assistant::{Error, SessionRole, UserContext};

mod common;

use common::{Harness, ScriptedCompletion};

fn registry() -> (Harness, ToolRegistry) {
    let harness = Harness::new(ScriptedCompletion::default());
    let tools = harness.tools();
    (harness, tools)
}

fn ctx(role: Option<SessionRole>, user_id: Option<&str>) -> ToolContext {
    let mut user = UserContext::new(None, role);
    if let Some(id) = user_id {
        user = user.with_user_id(id);
    }
    ToolContext { user }
}

async fn run(tools: &ToolRegistry, ctx: &ToolContext, name: &str, arguments: Value) -> Value {
    let call = ToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments,
    };
    let result = tools.execute(ctx, &call).await.unwrap();
    assert_eq!(result.tool_call_id, call.id);
    result.payload
}

#[test]
fn test_registry_lists_every_tool() {
    let (_harness, tools) = registry();
    let mut names = tools.names();
    names.sort();
    assert_eq!(
        names,
        vec![
            "addProduct",
            "deleteProduct",
            "getFarmerOrders",
            "getFarmingTips",
            "getWeatherForecast",
            "placeOrder",
            "searchProducts",
            "trackOrder",
            "updateProduct",
        ]
    );
}

#[test]
fn test_guest_sees_shared_tools_only() {
    let (_harness, tools) = registry();
    let mut names: Vec<String> = tools
        .definitions_for(&UserContext::default())
        .into_iter()
        .map(|d| d.name)
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["getFarmingTips", "getWeatherForecast", "searchProducts"]
    );
}

#[tokio::test]
async fn test_add_product_coerces_string_numbers() {
    let (harness, tools) = registry();
    let payload = run(
        &tools,
        &ctx(Some(SessionRole::Farmer), Some("farmer-1")),
        "addProduct",
        json!({"name": "Okra", "price": "₹ 40", "quantity": "12"}),
    )
    .await;

    assert_eq!(payload["success"], json!(true));
    assert_eq!(payload["product"]["name"], json!("Okra"));
    assert_eq!(payload["product"]["pricePerUnit"], json!(40.0));
    assert_eq!(harness.marketplace.calls(), vec!["add_product:farmer-1:Okra"]);
}

#[tokio::test]
async fn test_invalid_arguments_fail_before_service() {
    let (harness, tools) = registry();
    let farmer = ctx(Some(SessionRole::Farmer), Some("farmer-1"));

    let payload = run(&tools, &farmer, "addProduct", json!({"name": "Okra", "quantity": 5})).await;
    assert_eq!(payload, json!({"success": false, "message": "pricePerUnit is required"}));

    let payload = run(
        &tools,
        &farmer,
        "updateProduct",
        json!({"productId": "p-1", "quantity": -3}),
    )
    .await;
    assert_eq!(payload["message"], json!("quantity cannot be negative"));

    assert!(harness.marketplace.calls().is_empty());
}

#[tokio::test]
async fn test_signed_out_farmer_is_asked_to_sign_in() {
    let (harness, tools) = registry();
    let payload = run(
        &tools,
        &ctx(Some(SessionRole::Farmer), None),
        "deleteProduct",
        json!({"productId": "p-1"}),
    )
    .await;

    assert_eq!(payload, json!({"success": false, "message": "sign in required"}));
    assert!(harness.marketplace.calls().is_empty());
}

#[tokio::test]
async fn test_guest_cannot_order() {
    let (harness, tools) = registry();
    let payload = run(
        &tools,
        &ctx(None, None),
        "placeOrder",
        json!({"productId": "p-1", "quantity": 2}),
    )
    .await;

    assert_eq!(payload, json!({"success": false, "message": "buyer required"}));
    assert!(harness.marketplace.calls().is_empty());
}

#[tokio::test]
async fn test_rejection_is_reported_to_model() {
    let (harness, tools) = registry();
    let payload = run(
        &tools,
        &ctx(Some(SessionRole::Buyer), Some("buyer-7")),
        "trackOrder",
        json!({"orderId": 1042}),
    )
    .await;

    assert_eq!(payload, json!({"success": false, "message": "order not found"}));
    assert_eq!(harness.marketplace.calls(), vec!["track_order:1042"]);
}

#[tokio::test]
async fn test_farming_tips_available_to_guests() {
    let (_harness, tools) = registry();
    let payload = run(&tools, &ctx(None, None), "getFarmingTips", json!({"crop": "wheat"})).await;

    assert_eq!(payload["success"], json!(true));
    assert_eq!(payload["crop"], json!("wheat"));
    assert_eq!(payload["tips"][0], json!("Water wheat early in the morning."));
}

#[tokio::test]
async fn test_unknown_tool_is_an_error() {
    let (_harness, tools) = registry();
    let call = ToolCall {
        id: "call_x".to_string(),
        name: "refundEverything".to_string(),
        arguments: json!({}),
    };
    let result = tools.execute(&ctx(None, None), &call).await;
    assert!(matches!(result, Err(Error::UnknownTool(name)) if name == "refundEverything"));
}
