use serde::Serialize;

pub struct Masked;

pub trait MaskPolicy {
    fn mask(value: &str) -> String;
}

impl MaskPolicy for Masked {
    fn mask(value: &str) -> String {
        let len = value.chars().count();
        if len > 4 {
            let tail: String = value.chars().skip(len - 4).collect();
            "*".repeat(len - 4) + &tail
        } else {
            value.to_string()
        }
    }
}

/// Mask everything but the last 4 characters.
pub fn mask_digits(value: &str) -> String {
    Masked::mask(value)
}

/// Return true if a key name holds an MSISDN.
fn is_phone_key(key: &str) -> bool {
    let k = key.to_lowercase();
    k.contains("phone") || k == "msisdn" || k == "partya"
}

/// Return true if a key name holds a credential.
fn is_secret_key(key: &str) -> bool {
    let k = key.to_lowercase();
    k.contains("password")
        || k.contains("passkey")
        || k.contains("secret")
        || k.contains("token")
        || k == "authorization"
}

/// Return true if a key name holds a url that may carry a secret query.
fn is_url_key(key: &str) -> bool {
    let k = key.to_lowercase();
    k.contains("callbackurl") || k.contains("callback_url")
}

fn strip_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?***"),
        None => url.to_string(),
    }
}

pub fn secure_serializable(v: impl Serialize) -> serde_json::Value {
    let value = serde_json::to_value(v).unwrap_or(serde_json::Value::Null);
    secure_value(&value)
}

pub fn secure_value(v: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match v {
        Value::Object(map) => {
            let mut new = serde_json::Map::with_capacity(map.len());
            for (k, val) in map {
                let is_phone = is_phone_key(k);
                let is_secret = is_secret_key(k);
                let new_val = match val {
                    Value::String(_) | Value::Number(_) if is_secret => {
                        Value::String("***".to_string())
                    }
                    Value::String(s) if is_phone => Value::String(Masked::mask(s)),
                    Value::String(s) if is_url_key(k) => Value::String(strip_query(s)),
                    Value::Number(n) if is_phone => Value::String(Masked::mask(&n.to_string())),
                    _ => secure_value(val),
                };
                new.insert(k.clone(), new_val);
            }
            masked_metadata_item(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(secure_value).collect()),
        other => other.clone(),
    }
}

/// Callback metadata hides the phone behind `{"Name": "PhoneNumber", "Value": ...}`.
fn masked_metadata_item(mut map: serde_json::Map<String, serde_json::Value>) -> serde_json::Value {
    use serde_json::Value;

    let names_phone = map
        .get("Name")
        .and_then(Value::as_str)
        .is_some_and(is_phone_key);
    if names_phone {
        if let Some(value) = map.get_mut("Value") {
            let raw = match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            };
            if let Some(raw) = raw {
                *value = Value::String(Masked::mask(&raw));
            }
        }
    }
    Value::Object(map)
}
