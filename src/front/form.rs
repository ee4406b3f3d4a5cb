//! Field deserializers shared by HTML forms and JSON bodies. Amounts may be
//! typed with Arabic-Indic digits; empty form fields mean "not given".

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{de::Error, Deserialize, Deserializer};

use crate::accounting::money::parse_amount;

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Text(String),
    Number(serde_json::Number),
}

impl Raw {
    fn into_string(self) -> String {
        match self {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        }
    }
}

pub fn amount<'de, D>(d: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Raw::deserialize(d)?.into_string();
    parse_amount(&raw)
        .map_err(D::Error::custom)?
        .ok_or_else(|| D::Error::custom("amount is required"))
}

pub fn optional_amount<'de, D>(d: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Raw>::deserialize(d)? {
        Some(raw) => parse_amount(&raw.into_string()).map_err(D::Error::custom),
        None => Ok(None),
    }
}

pub fn optional_date<'de, D>(d: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(d)?.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid date '{s}'"))),
    }
}

/// HTML checkboxes are sent as `on` when ticked and not at all otherwise.
pub fn checkbox<'de, D>(d: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(
        Option::<String>::deserialize(d)?.as_deref(),
        Some("on" | "true" | "1")
    ))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    struct Payment {
        #[serde(deserialize_with = "amount")]
        amount: BigDecimal,
        #[serde(default, deserialize_with = "optional_amount")]
        discount: Option<BigDecimal>,
        #[serde(default, deserialize_with = "optional_date")]
        from: Option<NaiveDate>,
        #[serde(default, deserialize_with = "checkbox")]
        vat: bool,
    }

    #[test]
    fn json_amounts() {
        let p: Payment = serde_json::from_str(r#"{"amount": 12.5, "discount": "٣٫٥"}"#).unwrap();
        assert_eq!(p.amount, BigDecimal::from_str("12.5").unwrap());
        assert_eq!(p.discount, Some(BigDecimal::from_str("3.5").unwrap()));
        assert_eq!(p.from, None);
        assert!(!p.vat);

        assert!(serde_json::from_str::<Payment>(r#"{"amount": "abc"}"#).is_err());
        assert!(serde_json::from_str::<Payment>(r#"{"amount": ""}"#).is_err());
    }

    #[test]
    fn form_fields() {
        let p: Payment = serde_json::from_str(r#"{"amount": "1 250", "discount": "", "from": "2024-03-01", "vat": "on"}"#).unwrap();
        assert_eq!(p.amount, BigDecimal::from(1250));
        assert_eq!(p.discount, None);
        assert_eq!(p.from, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert!(p.vat);
    }
}
