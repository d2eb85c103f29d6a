use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Last-known state reported by the device over the `status` command.
///
/// Updated only by the status poller. Updates merge field by field, so a
/// reply that omits a field leaves the cached value in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub mode: String,
    pub btc_price: f64,
    pub btc_change: f64,
    pub wifi_connected: bool,
    /// Device-side uptime seconds at the moment it built the reply.
    pub last_update: u64,
    pub currency: String,
    /// Bridge-side timestamp of the last successful merge.
    pub polled_at: Option<DateTime<Utc>>,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            mode: "unknown".into(),
            btc_price: 0.0,
            btc_change: 0.0,
            wifi_connected: false,
            last_update: 0,
            currency: "usd".into(),
            polled_at: None,
        }
    }
}

impl DeviceStatus {
    /// Merge recognized fields from a parsed `status` reply. Unknown keys
    /// are ignored; absent keys keep their previous value.
    pub fn merge(&mut self, fields: &serde_json::Map<String, Value>) {
        if let Some(mode) = fields.get("mode").and_then(Value::as_str) {
            self.mode = mode.to_string();
        }
        if let Some(price) = fields.get("btc_price").and_then(Value::as_f64) {
            self.btc_price = price;
        }
        if let Some(change) = fields.get("btc_change").and_then(Value::as_f64) {
            self.btc_change = change;
        }
        if let Some(wifi) = fields.get("wifi_connected").and_then(Value::as_bool) {
            self.wifi_connected = wifi;
        }
        if let Some(ts) = fields.get("last_update").and_then(Value::as_u64) {
            self.last_update = ts;
        }
        if let Some(currency) = fields.get("currency").and_then(Value::as_str) {
            self.currency = currency.to_string();
        }
    }

    /// Display symbol for the device's configured fiat currency.
    pub fn currency_symbol(&self) -> &'static str {
        match self.currency.as_str() {
            "usd" => "$",
            "eur" => "€",
            "gbp" => "£",
            "jpy" | "cny" => "¥",
            "cad" => "C$",
            "aud" => "A$",
            "chf" => "CHF",
            "krw" => "₩",
            "rub" => "₽",
            _ => "",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommandReply {
    pub success: bool,
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorReply {
    pub success: bool,
    pub error: String,
}

impl ErrorReply {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn merge_updates_only_present_fields() {
        let mut status = DeviceStatus::default();
        status.wifi_connected = true;
        status.last_update = 1234;

        status.merge(&fields(json!({"mode": "sniff", "btc_price": 65000.1})));

        assert_eq!(status.mode, "sniff");
        assert_eq!(status.btc_price, 65000.1);
        assert!(status.wifi_connected);
        assert_eq!(status.last_update, 1234);
    }

    #[test]
    fn merge_ignores_unknown_keys() {
        let mut status = DeviceStatus::default();
        let before = status.clone();

        status.merge(&fields(json!({"uptime": 99, "rssi": -60})));

        assert_eq!(status, before);
    }

    #[test]
    fn merge_full_reply() {
        let mut status = DeviceStatus::default();
        status.merge(&fields(json!({
            "mode": "btc",
            "btc_price": 65000.1,
            "btc_change": -1.25,
            "wifi_connected": true,
            "last_update": 987,
            "currency": "eur",
        })));

        assert_eq!(status.mode, "btc");
        assert_eq!(status.btc_change, -1.25);
        assert!(status.wifi_connected);
        assert_eq!(status.last_update, 987);
        assert_eq!(status.currency, "eur");
        assert_eq!(status.currency_symbol(), "€");
    }

    #[test]
    fn unknown_currency_has_no_symbol() {
        let mut status = DeviceStatus::default();
        status.currency = "xyz".into();
        assert_eq!(status.currency_symbol(), "");
    }
}
