use serde::{
    Deserialize, Deserializer,
    de::{self, Visitor},
};

pub struct DurationVisitor;

impl<'de> Visitor<'de> for DurationVisitor {
    type Value = std::time::Duration;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a non-negative number of seconds")
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        u64::try_from(value)
            .map(std::time::Duration::from_secs)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(std::time::Duration::from_secs(value))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        std::time::Duration::try_from_secs_f64(value)
            .map_err(|_| E::invalid_value(de::Unexpected::Float(value), &self))
    }
}

struct Seconds(std::time::Duration);

impl<'de> Deserialize<'de> for Seconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor).map(Seconds)
    }
}

pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<std::time::Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Seconds>::deserialize(deserializer)?.map(|seconds| seconds.0))
}
