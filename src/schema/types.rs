use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gearbox kinds accepted in `specs.transmission`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transmission {
    #[serde(rename = "MT")]
    Manual,
    #[serde(rename = "AT")]
    Automatic,
    #[serde(rename = "CVT")]
    Cvt,
    #[serde(rename = "AMT")]
    Robotized,
}

impl Transmission {
    pub const ALL: [Transmission; 4] = [
        Transmission::Manual,
        Transmission::Automatic,
        Transmission::Cvt,
        Transmission::Robotized,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Transmission::Manual => "MT",
            Transmission::Automatic => "AT",
            Transmission::Cvt => "CVT",
            Transmission::Robotized => "AMT",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

impl fmt::Display for Transmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Technical specification block of an AI result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specs {
    pub year: u32,
    pub transmission: Transmission,
    pub engine: String,
    pub horsepower: u32,
    pub mileage_km: u32,
}

/// The equipment checklist. All eight sections are always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub comfort: Vec<String>,
    pub interior: Vec<String>,
    pub security: Vec<String>,
    pub exterior: Vec<String>,
    pub assist: Vec<String>,
    pub visibility: Vec<String>,
    pub safety: Vec<String>,
    pub multimedia: Vec<String>,
}

impl Equipment {
    /// Section names in the order the listing template renders them.
    pub const SECTIONS: [&'static str; 8] = [
        "comfort",
        "interior",
        "security",
        "exterior",
        "assist",
        "visibility",
        "safety",
        "multimedia",
    ];
}

/// Marketplace form fields proposed by the content generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvitoFields {
    pub category: String,
    pub brand: String,
    pub model: String,
    pub price_rub: u64,
    pub city: String,
    pub body_type: String,
    pub drive_type: String,
    pub color: String,
    pub owners: u32,
    pub payment_per_month_rub: u32,
}

impl AvitoFields {
    /// Keys every marketplace mapping must carry.
    pub const REQUIRED: [&'static str; 10] = [
        "category",
        "brand",
        "model",
        "price_rub",
        "city",
        "body_type",
        "drive_type",
        "color",
        "owners",
        "payment_per_month_rub",
    ];
}

/// Typed view of the structured listing content produced for one card.
///
/// Cards keep the exact JSON they were given; this type is for producers
/// building a result and consumers reading one back. Integral fields are
/// unsigned integers here, so a candidate carrying fractional numbers can
/// pass validation yet fail [`AiResult::from_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResult {
    pub title: String,
    pub description: String,
    pub specs: Specs,
    pub equipment: Equipment,
    pub avito_fields: AvitoFields,
}

impl AiResult {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    pub fn to_value(&self) -> Value {
        // Plain structs of strings, integers and vectors always serialize.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
