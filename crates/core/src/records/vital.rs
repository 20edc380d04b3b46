use crate::store::{FieldValue, Record};
use crate::{CareError, CareResult};
use care_uuid::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: u32,
    pub diastolic: u32,
}

/// A set of observations taken together. Every measurement is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Measurements {
    #[serde(default)]
    pub blood_pressure: Option<BloodPressure>,
    #[serde(default)]
    pub heart_rate: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub respiratory_rate: Option<u32>,
    #[serde(default)]
    pub oxygen_saturation: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub pain_level: Option<u8>,
}

impl Measurements {
    /// # Errors
    ///
    /// Returns [`CareError::InvalidInput`] naming the first out-of-range measurement.
    pub fn validate(&self) -> CareResult<()> {
        if let Some(bp) = self.blood_pressure {
            if bp.systolic == 0 || bp.diastolic == 0 {
                return Err(CareError::invalid("blood pressure values must be positive"));
            }
            if bp.diastolic >= bp.systolic {
                return Err(CareError::invalid(
                    "diastolic pressure must be below systolic pressure",
                ));
            }
        }
        positive_int("heart_rate", self.heart_rate)?;
        positive_int("respiratory_rate", self.respiratory_rate)?;
        positive("temperature", self.temperature)?;
        positive("weight", self.weight)?;
        positive("height", self.height)?;

        if let Some(spo2) = self.oxygen_saturation {
            if !spo2.is_finite() || !(0.0..=100.0).contains(&spo2) {
                return Err(CareError::invalid(
                    "oxygen_saturation must be between 0 and 100",
                ));
            }
        }
        if let Some(pain) = self.pain_level {
            if pain > 10 {
                return Err(CareError::invalid("pain_level must be between 0 and 10"));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Measurements::default()
    }
}

fn positive_int(name: &str, value: Option<u32>) -> CareResult<()> {
    match value {
        Some(0) => Err(CareError::invalid(format!("{name} must be positive"))),
        _ => Ok(()),
    }
}

fn positive(name: &str, value: Option<f64>) -> CareResult<()> {
    match value {
        Some(v) if !v.is_finite() || v <= 0.0 => {
            Err(CareError::invalid(format!("{name} must be positive")))
        }
        _ => Ok(()),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vital {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub nurse_id: RecordId,
    pub measurements: Measurements,
    #[serde(default)]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl Record for Vital {
    const COLLECTION: &'static str = "vitals";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "patient_id" => Some(self.patient_id.into()),
            "nurse_id" => Some(self.nurse_id.into()),
            "recorded_at" => Some(self.recorded_at.into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plausible_observations() {
        let m = Measurements {
            blood_pressure: Some(BloodPressure {
                systolic: 120,
                diastolic: 80,
            }),
            heart_rate: Some(72),
            temperature: Some(36.8),
            oxygen_saturation: Some(98.0),
            pain_level: Some(0),
            ..Default::default()
        };
        m.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let pain = Measurements {
            pain_level: Some(11),
            ..Default::default()
        };
        assert!(pain.validate().is_err());

        let spo2 = Measurements {
            oxygen_saturation: Some(101.0),
            ..Default::default()
        };
        assert!(spo2.validate().is_err());

        let weight = Measurements {
            weight: Some(-3.0),
            ..Default::default()
        };
        assert!(weight.validate().is_err());

        let bp = Measurements {
            blood_pressure: Some(BloodPressure {
                systolic: 70,
                diastolic: 90,
            }),
            ..Default::default()
        };
        assert!(bp.validate().is_err());
    }
}
