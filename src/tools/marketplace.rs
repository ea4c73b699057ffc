//! Catalog and order services consumed by the marketplace tools

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::MarketplaceConfig;
use crate::{Error, Result};

/// Result of a domain operation that may be refused for business reasons
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Operation performed
    Accepted(T),
    /// Operation refused, with a reason the user can act on
    Rejected(String),
}

/// Produce listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub price_per_unit: f64,
    pub unit: String,
    pub quantity: f64,
    #[serde(default)]
    pub farmer_id: Option<String>,
    #[serde(default)]
    pub farmer_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// New listing created by a farmer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub category: Option<String>,
    pub price_per_unit: f64,
    pub unit: String,
    pub quantity: f64,
    pub description: Option<String>,
}

/// Partial update of a listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_per_unit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProductUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.price_per_unit.is_none() && self.quantity.is_none() && self.description.is_none()
    }
}

/// Catalog search filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub query: Option<String>,
    pub category: Option<String>,
    pub max_price: Option<f64>,
}

/// Buyer's order request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub product_id: String,
    pub quantity: f64,
    pub delivery_address: Option<String>,
}

/// Placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub product_id: String,
    #[serde(default)]
    pub product_name: Option<String>,
    pub quantity: f64,
    pub total_price: f64,
    pub status: String,
    #[serde(default)]
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Catalog and order operations
///
/// `Err` means infrastructure failure; refusals the user can act on come
/// back as `Outcome::Rejected`.
#[async_trait]
pub trait MarketplaceService: Send + Sync {
    async fn add_product(&self, farmer_id: &str, product: NewProduct) -> Result<Outcome<Product>>;

    async fn update_product(
        &self,
        farmer_id: &str,
        product_id: &str,
        update: ProductUpdate,
    ) -> Result<Outcome<Product>>;

    async fn delete_product(&self, farmer_id: &str, product_id: &str) -> Result<Outcome<()>>;

    async fn farmer_orders(&self, farmer_id: &str, status: Option<&str>) -> Result<Vec<Order>>;

    async fn search_products(&self, query: &ProductQuery) -> Result<Vec<Product>>;

    async fn place_order(&self, buyer_id: &str, order: OrderRequest) -> Result<Outcome<Order>>;

    async fn track_order(&self, buyer_id: &str, order_id: &str) -> Result<Outcome<Order>>;
}

/// REST client for the marketplace backend
pub struct HttpMarketplace {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpMarketplace {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &MarketplaceConfig, token: Option<SecretString>) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Send and decode, mapping client errors to rejections
    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<Outcome<T>> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(Outcome::Accepted(response.json().await?));
        }

        let body = response.text().await.unwrap_or_default();
        if is_business_refusal(status) {
            tracing::debug!(status = %status, body = %body, "marketplace refused request");
            return Ok(Outcome::Rejected(refusal_reason(status, &body)));
        }

        tracing::error!(status = %status, body = %body, "marketplace API error");
        Err(Error::Tool(format!("marketplace API error {status}")))
    }
}

const fn is_business_refusal(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::FORBIDDEN
            | StatusCode::NOT_FOUND
            | StatusCode::CONFLICT
            | StatusCode::UNPROCESSABLE_ENTITY
    )
}

/// Prefer the server's `message` field, fall back to a status description
fn refusal_reason(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body).map_or_else(
        |_| match status {
            StatusCode::NOT_FOUND => "not found".to_string(),
            StatusCode::CONFLICT => "conflicts with the current state".to_string(),
            StatusCode::FORBIDDEN => "not allowed for this account".to_string(),
            _ => "invalid request".to_string(),
        },
        |b| b.message,
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OwnedProduct<'a> {
    farmer_id: &'a str,
    #[serde(flatten)]
    product: NewProduct,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OwnedOrder<'a> {
    buyer_id: &'a str,
    #[serde(flatten)]
    order: OrderRequest,
}

#[async_trait]
impl MarketplaceService for HttpMarketplace {
    async fn add_product(&self, farmer_id: &str, product: NewProduct) -> Result<Outcome<Product>> {
        let body = OwnedProduct { farmer_id, product };
        self.send(self.request(reqwest::Method::POST, "/products").json(&body))
            .await
    }

    async fn update_product(
        &self,
        farmer_id: &str,
        product_id: &str,
        update: ProductUpdate,
    ) -> Result<Outcome<Product>> {
        let path = format!("/products/{product_id}");
        self.send(
            self.request(reqwest::Method::PATCH, &path)
                .query(&[("farmerId", farmer_id)])
                .json(&update),
        )
        .await
    }

    async fn delete_product(&self, farmer_id: &str, product_id: &str) -> Result<Outcome<()>> {
        let path = format!("/products/{product_id}");
        let response = self
            .request(reqwest::Method::DELETE, &path)
            .query(&[("farmerId", farmer_id)])
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            return Ok(Outcome::Accepted(()));
        }
        let body = response.text().await.unwrap_or_default();
        if is_business_refusal(status) {
            return Ok(Outcome::Rejected(refusal_reason(status, &body)));
        }
        Err(Error::Tool(format!("marketplace API error {status}")))
    }

    async fn farmer_orders(&self, farmer_id: &str, status: Option<&str>) -> Result<Vec<Order>> {
        let path = format!("/farmers/{farmer_id}/orders");
        let mut builder = self.request(reqwest::Method::GET, &path);
        if let Some(status) = status {
            builder = builder.query(&[("status", status)]);
        }
        match self.send(builder).await? {
            Outcome::Accepted(orders) => Ok(orders),
            Outcome::Rejected(reason) => Err(Error::Tool(reason)),
        }
    }

    async fn search_products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(q) = &query.query {
            params.push(("q", q.clone()));
        }
        if let Some(category) = &query.category {
            params.push(("category", category.clone()));
        }
        if let Some(max_price) = query.max_price {
            params.push(("maxPrice", max_price.to_string()));
        }

        match self
            .send(self.request(reqwest::Method::GET, "/products").query(&params))
            .await?
        {
            Outcome::Accepted(products) => Ok(products),
            Outcome::Rejected(reason) => Err(Error::Tool(reason)),
        }
    }

    async fn place_order(&self, buyer_id: &str, order: OrderRequest) -> Result<Outcome<Order>> {
        let body = OwnedOrder { buyer_id, order };
        self.send(self.request(reqwest::Method::POST, "/orders").json(&body))
            .await
    }

    async fn track_order(&self, buyer_id: &str, order_id: &str) -> Result<Outcome<Order>> {
        let path = format!("/orders/{order_id}");
        self.send(
            self.request(reqwest::Method::GET, &path)
                .query(&[("buyerId", buyer_id)]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusal_reason_prefers_server_message() {
        assert_eq!(
            refusal_reason(StatusCode::CONFLICT, r#"{"message":"only 3 kg left"}"#),
            "only 3 kg left"
        );
        assert_eq!(refusal_reason(StatusCode::NOT_FOUND, "<html>"), "not found");
    }

    #[test]
    fn server_errors_are_not_refusals() {
        assert!(is_business_refusal(StatusCode::NOT_FOUND));
        assert!(!is_business_refusal(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_business_refusal(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn owned_product_flattens() {
        let body = OwnedProduct {
            farmer_id: "f1",
            product: NewProduct {
                name: "Tomatoes".to_string(),
                category: Some("vegetables".to_string()),
                price_per_unit: 30.0,
                unit: "kg".to_string(),
                quantity: 50.0,
                description: None,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["farmerId"], "f1");
        assert_eq!(json["pricePerUnit"], 30.0);
        assert_eq!(json["name"], "Tomatoes");
    }
}
