use serde::{Deserialize, Deserializer, Serializer};

/// Serde helpers for `std::time::Duration` as a human-readable string (`1m 2s 350ms`).
pub mod duration {
    use std::time::Duration;

    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Sub-millisecond precision is noise for wall-clock runtimes.
        let millis = Duration::from_millis(duration.as_millis() as u64);
        serializer.serialize_str(&humantime::format_duration(millis).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Timed {
        #[serde(with = "super::duration")]
        runtime: Duration,
    }

    #[test]
    fn serializes_to_humantime() {
        let timed = Timed {
            runtime: Duration::from_micros(62_350_999),
        };
        let json = serde_json::to_string(&timed).unwrap();
        assert_eq!(json, r#"{"runtime":"1m 2s 350ms"}"#);
        let back: Timed = serde_json::from_str(&json).unwrap();
        assert_eq!(back.runtime, Duration::from_millis(62_350));
    }

    #[test]
    fn rejects_garbage() {
        assert!(serde_json::from_str::<Timed>(r#"{"runtime":"soon"}"#).is_err());
    }
}
