//! Lookup data the form pages display: selectable countries and the price plans.
use crate::error::Result;
use log::{info, warn};
use serde::Serialize;
use std::path::Path;

/// One-time setup fee added to every plan, in [`CURRENCY`].
pub const SETUP_FEE: u32 = 20_000;
pub const CURRENCY: &str = "BDT";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PricePlan {
    pub name: &'static str,
    /// Yearly price after the running discount.
    pub annual_price: u32,
    /// Undiscounted yearly price, shown struck through.
    pub list_price: u32,
}

impl PricePlan {
    pub fn total_first_year(&self) -> u32 {
        self.annual_price + SETUP_FEE
    }
}

pub const PLANS: [PricePlan; 4] = [
    PricePlan {
        name: "Standard",
        annual_price: 10_000,
        list_price: 30_000,
    },
    PricePlan {
        name: "Professional",
        annual_price: 15_000,
        list_price: 35_000,
    },
    PricePlan {
        name: "Premium",
        annual_price: 25_000,
        list_price: 45_000,
    },
    PricePlan {
        name: "Premium Plus",
        annual_price: 50_000,
        list_price: 70_000,
    },
];

#[derive(Clone, Debug, Serialize)]
pub struct Catalog {
    pub countries: Vec<String>,
    pub plans: Vec<PricePlan>,
    pub setup_fee: u32,
    pub currency: &'static str,
}

impl Catalog {
    pub fn new(countries: Vec<String>) -> Self {
        Catalog {
            countries,
            plans: PLANS.to_vec(),
            setup_fee: SETUP_FEE,
            currency: CURRENCY,
        }
    }

    /// Loads the country list from a JSON array of names. A missing file
    /// yields an empty list; a file that is present but malformed is an error.
    pub fn load(countries_file: impl AsRef<Path>) -> Result<Self> {
        let path = countries_file.as_ref();
        if !path.exists() {
            warn!("Country list {} not found, offering none", path.display());
            return Ok(Catalog::new(Vec::new()));
        }
        let raw = std::fs::read_to_string(path)?;
        let countries: Vec<String> = serde_json::from_str(&raw)?;
        info!("Loaded {} countries from {}", countries.len(), path.display());
        Ok(Catalog::new(countries))
    }

    pub fn plan(&self, name: &str) -> Option<&PricePlan> {
        self.plans.iter().find(|p| p.name == name)
    }

    pub fn offers_plan(&self, name: &str) -> bool {
        self.plan(name).is_some()
    }
}
