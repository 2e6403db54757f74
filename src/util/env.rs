//! Process environment, deserialized once into [`Env`].
//!
//! Values are plain strings in the environment; the small deserializer below parses numeric and
//! boolean fields on demand so `Env` can use real types and serde's `rename`/`default` attributes.

use std::sync::LazyLock;

use serde::Deserialize;
use serde::de::value::MapDeserializer;
use serde::de::{self, IntoDeserializer};
use thiserror::Error;
use tokio::sync::OnceCell;

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);
pub async fn env() -> EnvResult<&'static Env> {
    ENV_VARS.get_or_try_init(|| async { Env::new() }).await
}

pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = env().await?;
    Ok(match var {
        Var::AdversusApiUrl => &vars.adversus_api_url,
        Var::AdversusApiKey => &vars.adversus_api_key,
        Var::RedisUrl => &vars.redis_url,
        Var::ApiServiceName => &vars.api_service_name,
        Var::ApiTracerName => &vars.api_tracer_name,
    })
}

#[inline]
fn default_adversus_url() -> String {
    String::from("https://api.adversus.dk/api")
}

#[inline]
const fn default_port() -> u16 {
    3000
}

#[inline]
const fn default_poll_interval() -> u64 {
    30
}

#[inline]
fn default_service_name() -> String {
    String::from("floorboard-api")
}

#[inline]
fn default_tracer_name() -> String {
    String::from("floorboard-tracer")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    #[serde(default = "default_adversus_url")]
    pub adversus_api_url: String,
    pub adversus_api_key: String,
    pub redis_url: String,
    #[serde(default = "default_port")]
    pub server_api_port: u16,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub api_service_name: String,
    #[serde(default = "default_tracer_name")]
    pub api_tracer_name: String,
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            return Err(e.into());
        }

        from_iter::<_, Env>(dotenvy::vars())?.validate()
    }

    /// Rejects values that deserialize but cannot be used.
    pub fn validate(self) -> EnvResult<Self> {
        if self.poll_interval_secs == 0 {
            return Err(EnvErr::InvalidValue {
                name: "POLL_INTERVAL_SECS",
                reason: "must be at least 1 second",
            });
        }

        Ok(self)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Var {
    AdversusApiUrl,
    AdversusApiKey,
    RedisUrl,
    ApiServiceName,
    ApiTracerName,
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

// ---
//  Deserializer implementation
// ---

/// A single variable's value, tagged with its name for error messages.
struct Val {
    name: String,
    value: String,
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for Val {
    type Deserializer = Self;
    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

macro_rules! parse_then_visit {
    ($($ty:ident => $method:ident,)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, EnvDeserializeError>
            where
                V: de::Visitor<'de>
            {
                match self.value.trim().parse::<$ty>() {
                    Ok(val) => val.into_deserializer().$method(visitor),
                    Err(e) => Err(de::Error::custom(format_args!(
                        "{e}: while parsing '{}' from {}",
                        self.value, self.name
                    ))),
                }
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for Val {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.value.into_deserializer().deserialize_any(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        // an empty assignment (`KEY=`) reads as unset
        if self.value.trim().is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_newtype_struct<V>(
        self,
        _: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    parse_then_visit! {
        bool => deserialize_bool,
        u16 => deserialize_u16,
        u32 => deserialize_u32,
        u64 => deserialize_u64,
        i64 => deserialize_i64,
        f64 => deserialize_f64,
    }

    serde::forward_to_deserialize_any! {
        i8 i16 i32 u8 f32 char str string unit bytes byte_buf map seq
        unit_struct tuple_struct identifier tuple enum ignored_any struct
    }
}

/// Deserializes `T` from `(name, value)` pairs, e.g. the process environment.
pub fn from_iter<Iter, T>(iter: Iter) -> Result<T, EnvDeserializeError>
where
    T: de::DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    let pairs = iter.into_iter().map(|(name, value)| {
        (
            name.clone(),
            Val {
                name,
                value,
            },
        )
    });

    T::deserialize(MapDeserializer::new(pairs))
}

impl de::Error for EnvDeserializeError {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        EnvDeserializeError::Custom(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        EnvDeserializeError::MissingValue(field.into())
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error(transparent)]
    DeserializationError(#[from] EnvDeserializeError),

    #[error("invalid {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum EnvDeserializeError {
    #[error("env deserialization error: {0}")]
    Custom(String),

    #[error("missing environment variable {0}")]
    MissingValue(String),
}
