//! Marketplace tool handlers exposed to the model
//!
//! Each handler owns the JSON argument contract of one tool: it coerces
//! numbers sent as strings, checks required fields and reports violations
//! as failure payloads the model can explain.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Datelike;
use serde_json::{Value, json};

use super::advisory::{AdvisoryService, MAX_FORECAST_DAYS, Season};
use super::marketplace::{
    MarketplaceService, NewProduct, OrderRequest, Outcome, ProductQuery, ProductUpdate,
};
use super::policy::{RoleRequirement, SessionRole};
use super::registry::{ToolContext, ToolHandler, ToolRegistry, failure, success};
use crate::Result;
use crate::llm::ToolDefinition;

/// Build the registry of all marketplace tools
#[must_use]
pub fn marketplace_registry(
    marketplace: Arc<dyn MarketplaceService>,
    advisory: Arc<dyn AdvisoryService>,
) -> ToolRegistry {
    ToolRegistry::new()
        .with(Arc::new(AddProduct(Arc::clone(&marketplace))))
        .with(Arc::new(UpdateProduct(Arc::clone(&marketplace))))
        .with(Arc::new(DeleteProduct(Arc::clone(&marketplace))))
        .with(Arc::new(GetFarmerOrders(Arc::clone(&marketplace))))
        .with(Arc::new(GetFarmingTips(Arc::clone(&advisory))))
        .with(Arc::new(GetWeatherForecast(advisory)))
        .with(Arc::new(SearchProducts(Arc::clone(&marketplace))))
        .with(Arc::new(PlaceOrder(Arc::clone(&marketplace))))
        .with(Arc::new(TrackOrder(marketplace)))
}

type ArgResult<T> = std::result::Result<T, String>;

/// Trimmed non-empty string; numbers are accepted for ids
fn string_arg(args: &Value, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_string(args: &Value, key: &str) -> ArgResult<String> {
    string_arg(args, key).ok_or_else(|| format!("{key} is required"))
}

/// Number given as JSON number or numeric string (`"25"`, `"₹ 25.5"`)
fn number_arg(args: &Value, key: &str) -> ArgResult<Option<f64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches('₹')
                .trim_start_matches("Rs")
                .trim_start_matches("rs")
                .chars()
                .filter(|c| *c != ',')
                .collect();
            if cleaned.trim().is_empty() {
                return Ok(None);
            }
            cleaned
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("{key} must be a number"))
        }
        Some(_) => Err(format!("{key} must be a number")),
    }
}

fn positive_number(args: &Value, key: &str) -> ArgResult<Option<f64>> {
    match number_arg(args, key)? {
        Some(n) if !n.is_finite() || n <= 0.0 => Err(format!("{key} must be greater than zero")),
        other => Ok(other),
    }
}

fn required_positive(args: &Value, key: &str) -> ArgResult<f64> {
    positive_number(args, key)?.ok_or_else(|| format!("{key} is required"))
}

fn signed_in_user(ctx: &ToolContext) -> ArgResult<&str> {
    ctx.user
        .user_id
        .as_deref()
        .ok_or_else(|| "sign in required".to_string())
}

fn definition(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

/// Convert an argument problem into the failure payload
macro_rules! try_arg {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(message) => return Ok(failure(message)),
        }
    };
}

fn from_outcome<T: serde::Serialize>(outcome: Outcome<T>, key: &str) -> Result<Value> {
    Ok(match outcome {
        Outcome::Accepted(value) => success(json!({ key: serde_json::to_value(value)? })),
        Outcome::Rejected(reason) => failure(reason),
    })
}

struct AddProduct(Arc<dyn MarketplaceService>);

#[async_trait]
impl ToolHandler for AddProduct {
    fn definition(&self) -> ToolDefinition {
        definition(
            "addProduct",
            "List a new product for sale from the farmer's harvest.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Product name, e.g. tomatoes"},
                    "pricePerUnit": {"type": "number", "description": "Price in rupees per unit"},
                    "quantity": {"type": "number", "description": "Quantity available"},
                    "unit": {"type": "string", "description": "Unit of sale (default kg)"},
                    "category": {"type": "string", "description": "vegetables, fruits, grains, dairy, ..."},
                    "description": {"type": "string"}
                },
                "required": ["name", "pricePerUnit", "quantity"]
            }),
        )
    }

    fn requirement(&self) -> RoleRequirement {
        RoleRequirement::Only(SessionRole::Farmer)
    }

    async fn call(&self, ctx: &ToolContext, args: &Value) -> Result<Value> {
        let farmer_id = try_arg!(signed_in_user(ctx));
        let name = try_arg!(required_string(args, "name"));
        // Models sometimes shorten the field to `price`
        let price = match try_arg!(positive_number(args, "pricePerUnit")) {
            Some(price) => price,
            None => match try_arg!(positive_number(args, "price")) {
                Some(price) => price,
                None => return Ok(failure("pricePerUnit is required")),
            },
        };
        let quantity = try_arg!(required_positive(args, "quantity"));

        let product = NewProduct {
            name,
            category: string_arg(args, "category"),
            price_per_unit: price,
            unit: string_arg(args, "unit").unwrap_or_else(|| "kg".to_string()),
            quantity,
            description: string_arg(args, "description"),
        };

        from_outcome(self.0.add_product(farmer_id, product).await?, "product")
    }
}

struct UpdateProduct(Arc<dyn MarketplaceService>);

#[async_trait]
impl ToolHandler for UpdateProduct {
    fn definition(&self) -> ToolDefinition {
        definition(
            "updateProduct",
            "Change the price, stock or description of one of the farmer's products.",
            json!({
                "type": "object",
                "properties": {
                    "productId": {"type": "string"},
                    "pricePerUnit": {"type": "number"},
                    "quantity": {"type": "number"},
                    "description": {"type": "string"}
                },
                "required": ["productId"]
            }),
        )
    }

    fn requirement(&self) -> RoleRequirement {
        RoleRequirement::Only(SessionRole::Farmer)
    }

    async fn call(&self, ctx: &ToolContext, args: &Value) -> Result<Value> {
        let farmer_id = try_arg!(signed_in_user(ctx));
        let product_id = try_arg!(required_string(args, "productId"));

        // Zero stock is a valid update (sold out)
        let quantity = try_arg!(number_arg(args, "quantity"));
        if quantity.is_some_and(|q| q < 0.0) {
            return Ok(failure("quantity cannot be negative"));
        }

        let update = ProductUpdate {
            price_per_unit: try_arg!(positive_number(args, "pricePerUnit")),
            quantity,
            description: string_arg(args, "description"),
        };
        if update.is_empty() {
            return Ok(failure("nothing to update: give a new price, quantity or description"));
        }

        from_outcome(
            self.0.update_product(farmer_id, &product_id, update).await?,
            "product",
        )
    }
}

struct DeleteProduct(Arc<dyn MarketplaceService>);

#[async_trait]
impl ToolHandler for DeleteProduct {
    fn definition(&self) -> ToolDefinition {
        definition(
            "deleteProduct",
            "Remove one of the farmer's products from the marketplace.",
            json!({
                "type": "object",
                "properties": {"productId": {"type": "string"}},
                "required": ["productId"]
            }),
        )
    }

    fn requirement(&self) -> RoleRequirement {
        RoleRequirement::Only(SessionRole::Farmer)
    }

    async fn call(&self, ctx: &ToolContext, args: &Value) -> Result<Value> {
        let farmer_id = try_arg!(signed_in_user(ctx));
        let product_id = try_arg!(required_string(args, "productId"));

        Ok(match self.0.delete_product(farmer_id, &product_id).await? {
            Outcome::Accepted(()) => success(json!({ "deletedProductId": product_id })),
            Outcome::Rejected(reason) => failure(reason),
        })
    }
}

struct GetFarmerOrders(Arc<dyn MarketplaceService>);

#[async_trait]
impl ToolHandler for GetFarmerOrders {
    fn definition(&self) -> ToolDefinition {
        definition(
            "getFarmerOrders",
            "List orders buyers have placed for the farmer's products.",
            json!({
                "type": "object",
                "properties": {
                    "status": {
                        "type": "string",
                        "enum": ["pending", "confirmed", "shipped", "delivered", "cancelled"]
                    }
                }
            }),
        )
    }

    fn requirement(&self) -> RoleRequirement {
        RoleRequirement::Only(SessionRole::Farmer)
    }

    async fn call(&self, ctx: &ToolContext, args: &Value) -> Result<Value> {
        let farmer_id = try_arg!(signed_in_user(ctx));
        let status = string_arg(args, "status").map(|s| s.to_lowercase());

        let orders = self.0.farmer_orders(farmer_id, status.as_deref()).await?;
        Ok(success(json!({ "count": orders.len(), "orders": orders })))
    }
}

struct GetFarmingTips(Arc<dyn AdvisoryService>);

#[async_trait]
impl ToolHandler for GetFarmingTips {
    fn definition(&self) -> ToolDefinition {
        definition(
            "getFarmingTips",
            "Practical growing, harvesting and storage tips for a crop in the current season.",
            json!({
                "type": "object",
                "properties": {"crop": {"type": "string", "description": "Crop name; omit for general tips"}}
            }),
        )
    }

    fn requirement(&self) -> RoleRequirement {
        RoleRequirement::Any
    }

    async fn call(&self, _ctx: &ToolContext, args: &Value) -> Result<Value> {
        let crop = string_arg(args, "crop");
        let season = Season::for_month(chrono::Local::now().month());

        let tips = self.0.farming_tips(crop.as_deref(), season).await?;
        Ok(success(json!({ "crop": crop, "season": season, "tips": tips })))
    }
}

struct GetWeatherForecast(Arc<dyn AdvisoryService>);

#[async_trait]
impl ToolHandler for GetWeatherForecast {
    fn definition(&self) -> ToolDefinition {
        definition(
            "getWeatherForecast",
            "Daily weather forecast (temperature and rain) for a village, town or district.",
            json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string"},
                    "days": {"type": "integer", "minimum": 1, "maximum": MAX_FORECAST_DAYS}
                },
                "required": ["location"]
            }),
        )
    }

    fn requirement(&self) -> RoleRequirement {
        RoleRequirement::Any
    }

    async fn call(&self, _ctx: &ToolContext, args: &Value) -> Result<Value> {
        let location = try_arg!(required_string(args, "location"));
        let days = try_arg!(number_arg(args, "days")).unwrap_or(3.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let days = days.round().clamp(1.0, f64::from(MAX_FORECAST_DAYS)) as u8;

        from_outcome(self.0.weather_forecast(&location, days).await?, "forecast")
    }
}

struct SearchProducts(Arc<dyn MarketplaceService>);

#[async_trait]
impl ToolHandler for SearchProducts {
    fn definition(&self) -> ToolDefinition {
        definition(
            "searchProducts",
            "Search the produce catalog by name, category or maximum price.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "category": {"type": "string"},
                    "maxPrice": {"type": "number", "description": "Maximum price per unit in rupees"}
                }
            }),
        )
    }

    fn requirement(&self) -> RoleRequirement {
        RoleRequirement::Any
    }

    async fn call(&self, _ctx: &ToolContext, args: &Value) -> Result<Value> {
        let query = ProductQuery {
            query: string_arg(args, "query"),
            category: string_arg(args, "category"),
            max_price: try_arg!(positive_number(args, "maxPrice")),
        };

        let products = self.0.search_products(&query).await?;
        Ok(success(json!({ "count": products.len(), "products": products })))
    }
}

struct PlaceOrder(Arc<dyn MarketplaceService>);

#[async_trait]
impl ToolHandler for PlaceOrder {
    fn definition(&self) -> ToolDefinition {
        definition(
            "placeOrder",
            "Order a quantity of a product for the buyer.",
            json!({
                "type": "object",
                "properties": {
                    "productId": {"type": "string"},
                    "quantity": {"type": "number"},
                    "deliveryAddress": {"type": "string"}
                },
                "required": ["productId", "quantity"]
            }),
        )
    }

    fn requirement(&self) -> RoleRequirement {
        RoleRequirement::Only(SessionRole::Buyer)
    }

    async fn call(&self, ctx: &ToolContext, args: &Value) -> Result<Value> {
        let buyer_id = try_arg!(signed_in_user(ctx));
        let order = OrderRequest {
            product_id: try_arg!(required_string(args, "productId")),
            quantity: try_arg!(required_positive(args, "quantity")),
            delivery_address: string_arg(args, "deliveryAddress"),
        };

        from_outcome(self.0.place_order(buyer_id, order).await?, "order")
    }
}

struct TrackOrder(Arc<dyn MarketplaceService>);

#[async_trait]
impl ToolHandler for TrackOrder {
    fn definition(&self) -> ToolDefinition {
        definition(
            "trackOrder",
            "Look up the status of one of the buyer's orders.",
            json!({
                "type": "object",
                "properties": {"orderId": {"type": "string"}},
                "required": ["orderId"]
            }),
        )
    }

    fn requirement(&self) -> RoleRequirement {
        RoleRequirement::Only(SessionRole::Buyer)
    }

    async fn call(&self, ctx: &ToolContext, args: &Value) -> Result<Value> {
        let buyer_id = try_arg!(signed_in_user(ctx));
        let order_id = try_arg!(required_string(args, "orderId"));

        from_outcome(self.0.track_order(buyer_id, &order_id).await?, "order")
    }
}
