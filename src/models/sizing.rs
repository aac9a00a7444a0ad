use clickhouse::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBucket {
    Small,
    Medium,
    Large,
    Xlarge,
    Xxlarge,
}

impl SizeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::Small => "small",
            SizeBucket::Medium => "medium",
            SizeBucket::Large => "large",
            SizeBucket::Xlarge => "xlarge",
            SizeBucket::Xxlarge => "xxlarge",
        }
    }
}

impl std::str::FromStr for SizeBucket {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(SizeBucket::Small),
            "medium" => Ok(SizeBucket::Medium),
            "large" => Ok(SizeBucket::Large),
            "xlarge" => Ok(SizeBucket::Xlarge),
            "xxlarge" => Ok(SizeBucket::Xxlarge),
            other => Err(anyhow::anyhow!("unknown size bucket '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct SizeBucketAssignment {
    pub practice_id: i64,
    pub organization_id: String,
    pub bucket: String,
    pub monthly_charges_avg: f64,
    pub percentile_in_global_distribution: f64,
    pub calculated_at: String,
}

/// Adaptive cohort boundaries on annualized charges, ascending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveThresholds {
    pub small_max: f64,
    pub medium_max: f64,
    pub large_max: f64,
    pub xlarge_max: f64,
}
