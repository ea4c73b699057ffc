//! Weather and farming advice services

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::marketplace::Outcome;
use crate::{Error, Result};

const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Longest forecast the tool will request
pub const MAX_FORECAST_DAYS: u8 = 7;

/// Daily forecast entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub max_temp_c: f64,
    pub min_temp_c: f64,
    pub precipitation_mm: f64,
    pub rain_chance_percent: Option<f64>,
}

/// Forecast for a resolved location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub location: String,
    pub days: Vec<DailyForecast>,
}

/// Cropping season on the Indian calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    /// Monsoon sowing, June to September
    Kharif,
    /// Winter sowing, October to February
    Rabi,
    /// Short summer season, March to May
    Zaid,
}

impl Season {
    #[must_use]
    pub const fn for_month(month: u32) -> Self {
        match month {
            6..=9 => Self::Kharif,
            3..=5 => Self::Zaid,
            _ => Self::Rabi,
        }
    }
}

/// Advisory lookups used by the tips and weather tools
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    /// Tips for a crop (or general tips) in the given season
    async fn farming_tips(&self, crop: Option<&str>, season: Season) -> Result<Vec<String>>;

    /// Daily forecast for a place name
    async fn weather_forecast(&self, location: &str, days: u8) -> Result<Outcome<Forecast>>;
}

/// Open-Meteo weather plus the built-in tip table
pub struct OpenMeteoAdvisory {
    client: Client,
}

impl OpenMeteoAdvisory {
    /// Create the service
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[derive(Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Deserialize)]
struct Place {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    admin1: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

impl Place {
    fn label(&self) -> String {
        [Some(self.name.as_str()), self.admin1.as_deref(), self.country.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Deserialize)]
struct ForecastResponse {
    daily: DailySeries,
}

#[derive(Deserialize)]
struct DailySeries {
    time: Vec<NaiveDate>,
    temperature_2m_max: Vec<f64>,
    temperature_2m_min: Vec<f64>,
    precipitation_sum: Vec<f64>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
}

impl DailySeries {
    fn into_days(self) -> Vec<DailyForecast> {
        self.time
            .iter()
            .enumerate()
            .filter_map(|(i, date)| {
                Some(DailyForecast {
                    date: *date,
                    max_temp_c: *self.temperature_2m_max.get(i)?,
                    min_temp_c: *self.temperature_2m_min.get(i)?,
                    precipitation_mm: *self.precipitation_sum.get(i)?,
                    rain_chance_percent: self.precipitation_probability_max.get(i).copied().flatten(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl AdvisoryService for OpenMeteoAdvisory {
    async fn farming_tips(&self, crop: Option<&str>, season: Season) -> Result<Vec<String>> {
        Ok(tips_for(crop, season))
    }

    async fn weather_forecast(&self, location: &str, days: u8) -> Result<Outcome<Forecast>> {
        let days = days.clamp(1, MAX_FORECAST_DAYS);

        let geo: GeocodingResponse = self
            .client
            .get(GEOCODING_URL)
            .query(&[("name", location), ("count", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(place) = geo.results.into_iter().next() else {
            return Ok(Outcome::Rejected(format!("could not find a place called {location}")));
        };

        let response = self
            .client
            .get(FORECAST_URL)
            .query(&[
                ("latitude", place.latitude.to_string()),
                ("longitude", place.longitude.to_string()),
                (
                    "daily",
                    "temperature_2m_max,temperature_2m_min,precipitation_sum,precipitation_probability_max"
                        .to_string(),
                ),
                ("timezone", "auto".to_string()),
                ("forecast_days", days.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Tool(format!("forecast API error {status}")));
        }

        let forecast: ForecastResponse = response.json().await?;
        tracing::debug!(location = %place.label(), days, "fetched forecast");

        Ok(Outcome::Accepted(Forecast {
            location: place.label(),
            days: forecast.daily.into_days(),
        }))
    }
}

/// Look up tips for a crop, falling back to general advice
#[must_use]
pub fn tips_for(crop: Option<&str>, season: Season) -> Vec<String> {
    let crop_tips: &[&str] = match crop.map(|c| c.trim().to_lowercase()).as_deref() {
        Some("tomato" | "tomatoes") => &[
            "Stake or cage plants early so fruit stays off wet soil.",
            "Water at the base in the morning to limit leaf blight.",
            "Pick at the breaker stage when selling to distant buyers; the fruit ripens in transit.",
        ],
        Some("onion" | "onions") => &[
            "Stop irrigation two to three weeks before harvest for better storage life.",
            "Cure bulbs in shade for a week before grading and packing.",
        ],
        Some("wheat") => &[
            "Irrigate at crown root initiation, about three weeks after sowing.",
            "Watch for yellow rust on leaves during cool humid spells.",
        ],
        Some("rice" | "paddy") => &[
            "Keep 2 to 5 cm of standing water during tillering.",
            "Drain the field ten days before harvest to ease cutting.",
        ],
        Some("potato" | "potatoes") => &[
            "Earth up rows when plants are about 20 cm tall.",
            "Store tubers in a cool dark place to prevent greening.",
        ],
        _ => &[],
    };

    let season_tip = match season {
        Season::Kharif => "Monsoon season: clear field drains and watch for fungal disease after heavy rain.",
        Season::Rabi => "Rabi season: protect nurseries from frost on cold nights with mulch or covers.",
        Season::Zaid => "Summer season: mulch beds and irrigate in the evening to save water.",
    };

    let mut tips: Vec<String> = crop_tips.iter().map(|t| (*t).to_string()).collect();
    if tips.is_empty() {
        tips.push("Test soil every two to three years and fertilise by the report, not by habit.".to_string());
        tips.push("Grade produce by size and quality before listing; graded lots sell for more.".to_string());
    }
    tips.push(season_tip.to_string());
    tips
}
