//! RPC dispatch.
//!
//! [`RpcRegistry`] maps `(Family, method)` to a [`Handler`]. A worker resolves
//! its device's handlers once at start ([`RpcRegistry::resolve`]) and runs
//! every inbound request through [`DeviceHandlers::dispatch`], which is pure:
//! it computes the response and the state mutation, and the worker applies it.

use std::collections::HashMap;

use rand::Rng;
use serde_json::{Value, json};

use crate::model::{DeviceState, RpcRequest};
use crate::policy::{self, Family, PolicyMode};

pub const CHECK_STATUS: &str = "checkStatus";

/// How a method's `params` become a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Truthiness of the raw JSON value.
    Bool,
    /// A number, numeric string, or bool.
    Float,
}

/// What a method does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Drift the readings and report them.
    Read,
    /// Replace one field with the coerced params.
    Write {
        field: &'static str,
        coercion: Coercion,
    },
}

const fn switch(field: &'static str) -> Handler {
    Handler::Write {
        field,
        coercion: Coercion::Bool,
    }
}

/// Method table for every family.
#[derive(Debug, Clone)]
pub struct RpcRegistry {
    handlers: HashMap<(Family, &'static str), Handler>,
}

impl Default for RpcRegistry {
    fn default() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };

        for family in [
            Family::Light,
            Family::Pump,
            Family::Valve,
            Family::Pool,
            Family::Irrigation,
            Family::Temperature,
            Family::SoilHumidity,
            Family::AirConditioner,
        ] {
            registry.register(family, CHECK_STATUS, Handler::Read);
        }

        registry.register(Family::Light, "switchLed", switch("status"));
        registry.register(Family::Pump, "switchPump", switch("status"));
        registry.register(Family::Valve, "switchValve", switch("status"));
        registry.register(Family::Pool, "switchStatus", switch("status"));
        registry.register(Family::Irrigation, "switchStatus", switch("status"));
        registry.register(Family::AirConditioner, "switchStatus", switch("status"));
        registry.register(
            Family::AirConditioner,
            "setTemperature",
            Handler::Write {
                field: "temperature",
                coercion: Coercion::Float,
            },
        );
        registry
    }
}

impl RpcRegistry {
    pub fn register(&mut self, family: Family, method: &'static str, handler: Handler) {
        self.handlers.insert((family, method), handler);
    }

    /// Handlers for one device. `family` is `None` for unrecognized types.
    pub fn resolve(&self, family: Option<Family>) -> DeviceHandlers {
        let methods: HashMap<&'static str, Handler> = family
            .map(|f| {
                self.handlers
                    .iter()
                    .filter(|((fam, _), _)| *fam == f)
                    .map(|(&(_, method), &handler)| (method, handler))
                    .collect()
            })
            .unwrap_or_default();
        DeviceHandlers { family, methods }
    }
}

/// A state change produced by an RPC.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub next_state: DeviceState,
    /// Published on the telemetry topic and recorded as metrics.
    pub telemetry: DeviceState,
}

/// Result of dispatching one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcOutcome {
    pub response: Value,
    /// `None` when the request was rejected.
    pub mutation: Option<Mutation>,
}

impl RpcOutcome {
    fn rejected(message: String) -> Self {
        Self {
            response: json!({ "error": message }),
            mutation: None,
        }
    }
}

/// Method table resolved for one device.
#[derive(Debug, Clone)]
pub struct DeviceHandlers {
    family: Option<Family>,
    methods: HashMap<&'static str, Handler>,
}

impl DeviceHandlers {
    pub fn family(&self) -> Option<Family> {
        self.family
    }

    pub fn handles(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Decide the response and mutation for `request`.
    ///
    /// Returns `None` for devices of an unrecognized type: no response is sent.
    pub fn dispatch<R: Rng + ?Sized>(
        &self,
        request: &RpcRequest,
        current: &DeviceState,
        rng: &mut R,
    ) -> Option<RpcOutcome> {
        let family = self.family?;

        let Some(&handler) = self.methods.get(request.method.as_str()) else {
            return Some(RpcOutcome::rejected(format!(
                "unsupported RPC method {} for {family}",
                request.method
            )));
        };

        let outcome = match handler {
            Handler::Read => {
                let telemetry = policy::generate(Some(family), current, PolicyMode::Drift, rng);
                RpcOutcome {
                    response: Value::Object(telemetry.payload.clone()),
                    mutation: Some(Mutation {
                        next_state: telemetry.next_state,
                        telemetry: telemetry.payload,
                    }),
                }
            }
            Handler::Write { field, coercion } => {
                let Some(value) = coerce(&request.params, coercion) else {
                    return Some(RpcOutcome::rejected(format!(
                        "invalid params for {}: {}",
                        request.method, request.params
                    )));
                };
                let mut next_state = current.clone();
                next_state.insert(field.to_owned(), value.clone());
                RpcOutcome {
                    response: json!({ field: value }),
                    mutation: Some(Mutation {
                        telemetry: next_state.clone(),
                        next_state,
                    }),
                }
            }
        };
        Some(outcome)
    }
}

/// Convert raw params to a field value, or `None` when impossible.
pub fn coerce(params: &Value, coercion: Coercion) -> Option<Value> {
    match coercion {
        Coercion::Bool => Some(Value::Bool(truthy(params))),
        Coercion::Float => {
            let value = match params {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            }?;
            value.is_finite().then(|| json!(value))
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn request(method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            method: method.into(),
            params,
            correlation_id: "1".into(),
        }
    }

    fn handlers(family: Family) -> DeviceHandlers {
        RpcRegistry::default().resolve(Some(family))
    }

    fn state(value: Value) -> DeviceState {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn registry_covers_family_methods() {
        assert!(handlers(Family::Light).handles("switchLed"));
        assert!(!handlers(Family::Light).handles("switchPump"));
        assert!(handlers(Family::Pump).handles("switchPump"));
        assert!(handlers(Family::Valve).handles("switchValve"));
        assert!(handlers(Family::Irrigation).handles("switchStatus"));
        assert!(handlers(Family::AirConditioner).handles("setTemperature"));
        assert!(handlers(Family::Temperature).handles(CHECK_STATUS));
        assert!(!handlers(Family::Temperature).handles("switchStatus"));
    }

    #[test]
    fn bool_coercion_follows_truthiness() {
        let cases = [
            (json!(true), true),
            (json!(false), false),
            (json!(0), false),
            (json!(1), true),
            (json!(0.0), false),
            (json!(""), false),
            (json!("false"), true),
            (json!(null), false),
            (json!([]), false),
            (json!({ "on": 1 }), true),
        ];
        for (params, expected) in cases {
            assert_eq!(coerce(&params, Coercion::Bool), Some(json!(expected)), "{params}");
        }
    }

    #[test]
    fn float_coercion_accepts_numbers_strings_bools() {
        assert_eq!(coerce(&json!(21.5), Coercion::Float), Some(json!(21.5)));
        assert_eq!(coerce(&json!(" 19 "), Coercion::Float), Some(json!(19.0)));
        assert_eq!(coerce(&json!(true), Coercion::Float), Some(json!(1.0)));
        assert_eq!(coerce(&json!("warm"), Coercion::Float), None);
        assert_eq!(coerce(&json!({ "t": 1 }), Coercion::Float), None);
        assert_eq!(coerce(&json!(null), Coercion::Float), None);
    }

    #[test]
    fn write_replaces_only_target_field() {
        let mut rng = StdRng::seed_from_u64(1);
        let current = state(json!({ "status": false, "temperature": 22.0, "humidity": 55.0 }));
        let outcome = handlers(Family::AirConditioner)
            .dispatch(&request("switchStatus", json!(1)), &current, &mut rng)
            .unwrap();

        assert_eq!(outcome.response, json!({ "status": true }));
        let mutation = outcome.mutation.unwrap();
        assert_eq!(
            mutation.next_state,
            state(json!({ "status": true, "temperature": 22.0, "humidity": 55.0 }))
        );
        assert_eq!(mutation.telemetry, mutation.next_state);
    }

    #[test]
    fn set_temperature_parses_strings() {
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = handlers(Family::AirConditioner)
            .dispatch(&request("setTemperature", json!("18.5")), &DeviceState::new(), &mut rng)
            .unwrap();
        assert_eq!(outcome.response, json!({ "temperature": 18.5 }));
    }

    #[test]
    fn invalid_params_do_not_mutate() {
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = handlers(Family::AirConditioner)
            .dispatch(&request("setTemperature", json!("hot")), &DeviceState::new(), &mut rng)
            .unwrap();
        assert!(outcome.mutation.is_none());
        let message = outcome.response["error"].as_str().unwrap();
        assert!(message.starts_with("invalid params"), "{message}");
    }

    #[test]
    fn unknown_method_is_rejected_without_mutation() {
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = handlers(Family::Light)
            .dispatch(&request("selfDestruct", json!(true)), &DeviceState::new(), &mut rng)
            .unwrap();
        assert!(outcome.mutation.is_none());
        let message = outcome.response["error"].as_str().unwrap();
        assert!(message.starts_with("unsupported RPC method selfDestruct"), "{message}");
    }

    #[test]
    fn unknown_family_gets_no_response() {
        let mut rng = StdRng::seed_from_u64(1);
        let handlers = RpcRegistry::default().resolve(None);
        assert!(
            handlers
                .dispatch(&request(CHECK_STATUS, Value::Null), &DeviceState::new(), &mut rng)
                .is_none()
        );
    }

    #[test]
    fn binary_write_then_read_round_trips() {
        let mut rng = StdRng::seed_from_u64(1);
        let light = handlers(Family::Light);

        let write = light
            .dispatch(&request("switchLed", json!(true)), &DeviceState::new(), &mut rng)
            .unwrap();
        let after_write = write.mutation.unwrap().next_state;

        let read = light
            .dispatch(&request(CHECK_STATUS, Value::Null), &after_write, &mut rng)
            .unwrap();
        assert_eq!(read.response, json!({ "status": true }));
    }

    #[test]
    fn binary_reads_are_idempotent() {
        let mut rng = StdRng::seed_from_u64(1);
        let pump = handlers(Family::Pump);
        let mut current = state(json!({ "status": true }));

        for _ in 0..5 {
            let outcome = pump
                .dispatch(&request(CHECK_STATUS, Value::Null), &current, &mut rng)
                .unwrap();
            let next = outcome.mutation.unwrap().next_state;
            assert_eq!(next, current);
            current = next;
        }
    }

    #[test]
    fn read_response_matches_published_payload() {
        let mut rng = StdRng::seed_from_u64(3);
        let current = state(json!({ "status": true, "brightness": 3 }));
        let outcome = handlers(Family::Light)
            .dispatch(&request(CHECK_STATUS, Value::Null), &current, &mut rng)
            .unwrap();

        assert_eq!(outcome.response, json!({ "status": true }));
        let mutation = outcome.mutation.unwrap();
        assert_eq!(outcome.response, Value::Object(mutation.telemetry));
        assert_eq!(mutation.next_state, current);
    }

    #[test]
    fn temperature_read_drifts_within_bounds() {
        let mut rng = StdRng::seed_from_u64(99);
        let current = state(json!({ "temperature": 0.1, "humidity": 40.0 }));
        let outcome = handlers(Family::Temperature)
            .dispatch(&request(CHECK_STATUS, Value::Null), &current, &mut rng)
            .unwrap();

        let t = outcome.response["temperature"].as_f64().unwrap();
        assert!((0.0..=0.6).contains(&t), "temperature {t}");
        assert_eq!(
            outcome.mutation.unwrap().telemetry.keys().collect::<Vec<_>>(),
            vec!["temperature", "humidity"]
        );
    }
}
