//! # Car Records
//!
//! Listing record as stored and served.
//!
//! ## Schema
//! - brand, model (**string**, trimmed, required)
//! - year (**int**), price (**float**), currency (**string**, default "USD")
//! - engine: type, fuel, transmission (**string**), hp (**int**)
//! - mileage (**int**, default 0)
//! - condition: New or Used (default Used)
//! - status: Available, Sold or Reserved (default Available)
//! - imageUrl (**string**, required), tags (list of **string**, default empty)
//! - createdAt, set by the server on insert
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_CURRENCY: &str = "USD";
const FIRST_CAR_YEAR: i32 = 1886;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Engine {
    #[serde(rename = "type")]
    pub kind: String,
    pub fuel: String,
    pub hp: u32,
    pub transmission: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    New,
    #[default]
    Used,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Available,
    Sold,
    Reserved,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Car {
    pub id: String,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub price: f64,
    pub currency: String,
    pub engine: Engine,
    pub mileage: u64,
    pub condition: Condition,
    pub image_url: String,
    pub status: Status,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Create payload, optional fields fall back to the schema defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCar {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub price: f64,
    #[serde(default)]
    pub currency: Option<String>,
    pub engine: Engine,
    #[serde(default)]
    pub mileage: Option<u64>,
    #[serde(default)]
    pub condition: Option<Condition>,
    pub image_url: String,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewCar {
    /// Validates and normalizes into a record without an id.
    pub fn into_car(self) -> Result<Car, AppError> {
        let brand = required(&self.brand, "brand")?;
        let model = required(&self.model, "model")?;
        let image_url = required(&self.image_url, "imageUrl")?;

        let latest_year = Utc::now().year() + 1;
        if !(FIRST_CAR_YEAR..=latest_year).contains(&self.year) {
            return Err(AppError::Invalid("year".into()));
        }

        if !self.price.is_finite() || self.price < 0.0 {
            return Err(AppError::Invalid("price".into()));
        }

        let engine = Engine {
            kind: required(&self.engine.kind, "engine.type")?,
            fuel: required(&self.engine.fuel, "engine.fuel")?,
            hp: self.engine.hp,
            transmission: required(&self.engine.transmission, "engine.transmission")?,
        };
        if engine.hp == 0 {
            return Err(AppError::Invalid("engine.hp".into()));
        }

        let currency = match self.currency.as_deref().map(str::trim) {
            Some(currency) if !currency.is_empty() => currency.to_uppercase(),
            _ => DEFAULT_CURRENCY.to_string(),
        };

        Ok(Car {
            id: String::new(),
            brand,
            model,
            year: self.year,
            price: self.price,
            currency,
            engine,
            mileage: self.mileage.unwrap_or_default(),
            condition: self.condition.unwrap_or_default(),
            image_url,
            status: self.status.unwrap_or_default(),
            tags: self
                .tags
                .iter()
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
            created_at: Utc::now(),
        })
    }
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Err(AppError::Invalid(field.to_string()));
    }

    Ok(trimmed.to_string())
}

/// One page of the listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListingPage {
    pub items: Vec<Car>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}
