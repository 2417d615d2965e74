//! Vacancy catalog abstraction.
//!
//! The catalog lives outside this system (a spreadsheet, an ATS, whatever).
//! The engine only reads it, per city, and tolerates staleness.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::VacancyError;

/// An open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vacancy {
    /// Stable vacancy identifier.
    pub id: String,
    /// Human-readable title (pickup point, partner name).
    pub title: String,
    pub city: String,
    /// Work shift label, if the source carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift: Option<String>,
    /// Per-delivery fee, if the source carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_fee: Option<Decimal>,
}

impl Vacancy {
    /// One-line description used in list menus.
    pub fn menu_description(&self) -> String {
        let mut parts = Vec::new();
        if let Some(ref shift) = self.shift {
            parts.push(format!("Shift: {shift}"));
        }
        if let Some(fee) = self.delivery_fee {
            parts.push(format!("Fee: {fee}"));
        }
        parts.join(" | ")
    }
}

/// Read-only view of the external vacancy catalog.
#[async_trait]
pub trait VacancySource: Send + Sync {
    /// Cities that currently have at least one open position.
    async fn cities(&self) -> Result<Vec<String>, VacancyError>;

    /// Open positions in a city. May be stale; never mutated by the engine.
    async fn list_open(&self, city: &str) -> Result<Vec<Vacancy>, VacancyError>;
}

/// Fixed in-memory catalog for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticVacancySource {
    vacancies: Vec<Vacancy>,
}

impl StaticVacancySource {
    pub fn new(vacancies: Vec<Vacancy>) -> Self {
        Self { vacancies }
    }

    /// Load a catalog from a JSON array of vacancies.
    pub fn from_json(raw: &str) -> Result<Self, VacancyError> {
        let vacancies: Vec<Vacancy> =
            serde_json::from_str(raw).map_err(|e| VacancyError::Fetch(e.to_string()))?;
        Ok(Self::new(vacancies))
    }
}

#[async_trait]
impl VacancySource for StaticVacancySource {
    async fn cities(&self) -> Result<Vec<String>, VacancyError> {
        let mut cities: Vec<String> = self.vacancies.iter().map(|v| v.city.clone()).collect();
        cities.sort();
        cities.dedup();
        Ok(cities)
    }

    async fn list_open(&self, city: &str) -> Result<Vec<Vacancy>, VacancyError> {
        Ok(self
            .vacancies
            .iter()
            .filter(|v| v.city.eq_ignore_ascii_case(city))
            .cloned()
            .collect())
    }
}
