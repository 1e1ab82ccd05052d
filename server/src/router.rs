//! Declarative ingress validation and dispatch.
//!
//! Every inbound frame is `{"event": name, "data": {...}}`. The router keeps
//! one [`EventRule`] per event name: required fields, types, string caps,
//! enumerations, and numeric ranges, including nested paths like
//! `position.x`. A failing frame is refused with field-level reasons before any
//! handler sees it. On success the data is sanitized (strings trimmed,
//! markup characters stripped, capped), a server timestamp is stamped when
//! the client sent none, and the typed [`ClientEvent`] is produced.
//!
//! Numeric bounds derive from [`GameConfig`] and the field constants; the
//! router never hard-codes geometry.

use std::collections::HashMap;

use serde_json::Value;

use shared::config::GameConfig;
use shared::constants::{FIELD_HEIGHT, FIELD_WIDTH};
use shared::protocol::{ClientEvent, FieldError, ValidationErrorPayload};

use crate::rate_limit::EventClass;

/// Longest string the sanitizer lets through anywhere in a payload.
const SANITIZED_STRING_CAP: usize = 1000;

/// Field type plus constraints.
#[derive(Debug, Clone)]
enum FieldKind {
    Str { max_len: usize },
    Number { min: f64, max: f64 },
    Bool,
    Object,
    Enum(&'static [&'static str]),
}

/// One field's rule, addressed by dotted path.
#[derive(Debug, Clone)]
struct FieldRule {
    path: &'static str,
    required: bool,
    kind: FieldKind,
}

impl FieldRule {
    fn required(path: &'static str, kind: FieldKind) -> Self {
        Self {
            path,
            required: true,
            kind,
        }
    }

    fn optional(path: &'static str, kind: FieldKind) -> Self {
        Self {
            path,
            required: false,
            kind,
        }
    }
}

/// Per-event validation rule.
#[derive(Debug, Clone)]
pub struct EventRule {
    /// Rate-limit class this event draws from.
    pub class: EventClass,
    /// Whether the sender must be authenticated.
    pub requires_auth: bool,
    fields: Vec<FieldRule>,
}

/// Routing outcome for one frame.
#[derive(Debug)]
pub enum RouteOutcome {
    /// Frame passed; dispatch the typed event.
    Accepted {
        event: ClientEvent,
        class: EventClass,
        requires_auth: bool,
    },
    /// Schema violation; reply with `validation_error`, drop the frame.
    Invalid(ValidationErrorPayload),
    /// Not a recognizable frame at all; reply with `event_error`.
    Malformed { reason: String },
}

/// The rule table plus the config its numeric bounds derive from.
pub struct EventRouter {
    rules: HashMap<&'static str, EventRule>,
}

impl EventRouter {
    pub fn new(config: &GameConfig) -> Self {
        let m = config.position_margin as f64;
        let x_range = FieldKind::Number {
            min: -m,
            max: FIELD_WIDTH as f64 + m,
        };
        let y_range = FieldKind::Number {
            min: -m,
            max: FIELD_HEIGHT as f64 + m,
        };
        let vel_range = FieldKind::Number {
            min: -4.0 * config.max_ball_speed as f64,
            max: 4.0 * config.max_ball_speed as f64,
        };
        let ts = FieldKind::Number {
            min: 0.0,
            max: f64::MAX,
        };

        let mut rules = HashMap::new();
        rules.insert(
            "authenticate",
            EventRule {
                class: EventClass::General,
                requires_auth: false,
                fields: vec![
                    FieldRule::required("playerId", FieldKind::Str { max_len: 50 }),
                    FieldRule::required("username", FieldKind::Str { max_len: 20 }),
                    FieldRule::optional("token", FieldKind::Str { max_len: 200 }),
                    FieldRule::optional("characterId", FieldKind::Str { max_len: 50 }),
                ],
            },
        );
        rules.insert(
            "join_matchmaking",
            EventRule {
                class: EventClass::Matchmaking,
                requires_auth: true,
                fields: vec![
                    FieldRule::required(
                        "gameMode",
                        FieldKind::Enum(&["casual", "ranked", "tournament"]),
                    ),
                    FieldRule::optional("region", FieldKind::Str { max_len: 50 }),
                    FieldRule::optional("preferences", FieldKind::Object),
                ],
            },
        );
        rules.insert(
            "leave_matchmaking",
            EventRule {
                class: EventClass::Matchmaking,
                requires_auth: true,
                fields: vec![FieldRule::optional("reason", FieldKind::Str { max_len: 200 })],
            },
        );
        rules.insert(
            "ready_up",
            EventRule {
                class: EventClass::General,
                requires_auth: true,
                fields: vec![FieldRule::optional("ready", FieldKind::Bool)],
            },
        );
        rules.insert(
            "player_input",
            EventRule {
                class: EventClass::Movement,
                requires_auth: true,
                fields: vec![
                    FieldRule::required("keys", FieldKind::Object),
                    FieldRule::optional("keys.left", FieldKind::Bool),
                    FieldRule::optional("keys.right", FieldKind::Bool),
                    FieldRule::optional("keys.up", FieldKind::Bool),
                    FieldRule::optional("keys.kick", FieldKind::Bool),
                    FieldRule::required("timestamp", ts.clone()),
                    FieldRule::optional("sequenceId", ts.clone()),
                ],
            },
        );
        rules.insert(
            "player_movement",
            EventRule {
                class: EventClass::Movement,
                requires_auth: true,
                fields: vec![
                    FieldRule::optional("keys", FieldKind::Object),
                    FieldRule::optional("position", FieldKind::Object),
                    FieldRule::optional("position.x", x_range.clone()),
                    FieldRule::optional("position.y", y_range.clone()),
                    FieldRule::optional("velocity", FieldKind::Object),
                    FieldRule::optional("velocity.x", vel_range.clone()),
                    FieldRule::optional("velocity.y", vel_range.clone()),
                    FieldRule::required("timestamp", ts.clone()),
                    FieldRule::optional("sequenceId", ts.clone()),
                ],
            },
        );
        rules.insert(
            "ball_update",
            EventRule {
                class: EventClass::Movement,
                requires_auth: true,
                fields: vec![
                    FieldRule::required("position", FieldKind::Object),
                    FieldRule::required("position.x", x_range.clone()),
                    FieldRule::required("position.y", y_range.clone()),
                    FieldRule::required("velocity", FieldKind::Object),
                    FieldRule::required("velocity.x", vel_range.clone()),
                    FieldRule::required("velocity.y", vel_range),
                    FieldRule::required("timestamp", ts.clone()),
                    FieldRule::optional("spin", FieldKind::Number { min: -100.0, max: 100.0 }),
                ],
            },
        );
        rules.insert(
            "goal_attempt",
            EventRule {
                class: EventClass::Movement,
                requires_auth: true,
                fields: vec![
                    FieldRule::required("position", FieldKind::Object),
                    FieldRule::required("position.x", x_range),
                    FieldRule::required("position.y", y_range),
                    FieldRule::required("power", FieldKind::Number { min: 0.0, max: 100.0 }),
                    FieldRule::required(
                        "direction",
                        FieldKind::Number {
                            min: -360.0,
                            max: 360.0,
                        },
                    ),
                    FieldRule::required("timestamp", ts.clone()),
                ],
            },
        );
        rules.insert(
            "chat_message",
            EventRule {
                class: EventClass::Chat,
                requires_auth: true,
                fields: vec![
                    FieldRule::required("message", FieldKind::Str { max_len: 200 }),
                    FieldRule::required("type", FieldKind::Enum(&["all", "team", "private"])),
                    FieldRule::optional("target", FieldKind::Str { max_len: 50 }),
                ],
            },
        );
        rules.insert(
            "pause_request",
            EventRule {
                class: EventClass::General,
                requires_auth: true,
                fields: vec![FieldRule::required("reason", FieldKind::Str { max_len: 100 })],
            },
        );
        rules.insert(
            "resume_request",
            EventRule {
                class: EventClass::General,
                requires_auth: true,
                fields: vec![],
            },
        );
        rules.insert(
            "forfeit_game",
            EventRule {
                class: EventClass::General,
                requires_auth: true,
                fields: vec![FieldRule::optional("reason", FieldKind::Str { max_len: 200 })],
            },
        );
        rules.insert(
            "request_game_end",
            EventRule {
                class: EventClass::General,
                requires_auth: true,
                fields: vec![
                    FieldRule::required(
                        "reason",
                        FieldKind::Enum(&["time_up", "mutual_agreement", "admin_request"]),
                    ),
                    FieldRule::optional("confirmed", FieldKind::Bool),
                    FieldRule::optional("adminCode", FieldKind::Str { max_len: 50 }),
                ],
            },
        );
        rules.insert(
            "join_room",
            EventRule {
                class: EventClass::General,
                requires_auth: true,
                fields: vec![
                    FieldRule::optional("roomId", FieldKind::Str { max_len: 50 }),
                    FieldRule::optional("matchId", FieldKind::Str { max_len: 50 }),
                ],
            },
        );
        rules.insert(
            "leave_room",
            EventRule {
                class: EventClass::General,
                requires_auth: true,
                fields: vec![
                    FieldRule::optional("roomId", FieldKind::Str { max_len: 50 }),
                    FieldRule::optional("matchId", FieldKind::Str { max_len: 50 }),
                ],
            },
        );
        rules.insert(
            "ping_latency",
            EventRule {
                class: EventClass::General,
                requires_auth: false,
                fields: vec![FieldRule::required("clientTime", ts)],
            },
        );

        Self { rules }
    }

    pub fn rule(&self, event: &str) -> Option<&EventRule> {
        self.rules.get(event)
    }

    /// Validates one raw frame and produces the typed event.
    pub fn route(&self, frame: Value, server_now_ms: u64) -> RouteOutcome {
        let Some(event_name) = frame.get("event").and_then(Value::as_str) else {
            return RouteOutcome::Malformed {
                reason: "frame has no event name".into(),
            };
        };
        let event_name = event_name.to_string();
        let Some(rule) = self.rules.get(event_name.as_str()) else {
            return RouteOutcome::Malformed {
                reason: format!("unknown event '{}'", event_name),
            };
        };

        let mut data = frame.get("data").cloned().unwrap_or(Value::Object(Default::default()));
        if !data.is_object() {
            return RouteOutcome::Invalid(ValidationErrorPayload {
                event: event_name,
                errors: vec![FieldError {
                    field: "data".into(),
                    reason: "payload must be an object".into(),
                }],
            });
        }

        // Stamp first: a frame without a client timestamp gets the server's,
        // and the rule check then sees a complete payload.
        stamp_timestamp(&mut data, server_now_ms);

        let errors = check_fields(&data, &rule.fields);
        if !errors.is_empty() {
            return RouteOutcome::Invalid(ValidationErrorPayload {
                event: event_name,
                errors,
            });
        }

        sanitize_strings(&mut data);

        let typed = serde_json::json!({ "event": event_name, "data": data });
        match serde_json::from_value::<ClientEvent>(typed) {
            Ok(event) => RouteOutcome::Accepted {
                event,
                class: rule.class,
                requires_auth: rule.requires_auth,
            },
            Err(err) => RouteOutcome::Invalid(ValidationErrorPayload {
                event: event_name,
                errors: vec![FieldError {
                    field: "data".into(),
                    reason: format!("payload shape: {}", err),
                }],
            }),
        }
    }
}

fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

fn check_fields(data: &Value, rules: &[FieldRule]) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for rule in rules {
        let value = lookup(data, rule.path);
        let Some(value) = value else {
            if rule.required {
                errors.push(FieldError {
                    field: rule.path.to_string(),
                    reason: "required field missing".into(),
                });
            }
            continue;
        };
        if value.is_null() {
            if rule.required {
                errors.push(FieldError {
                    field: rule.path.to_string(),
                    reason: "required field is null".into(),
                });
            }
            continue;
        }

        match &rule.kind {
            FieldKind::Str { max_len } => match value.as_str() {
                Some(s) if s.len() <= *max_len => {}
                Some(_) => errors.push(FieldError {
                    field: rule.path.to_string(),
                    reason: format!("string longer than {} chars", max_len),
                }),
                None => errors.push(FieldError {
                    field: rule.path.to_string(),
                    reason: "expected a string".into(),
                }),
            },
            FieldKind::Number { min, max } => match value.as_f64() {
                Some(n) if n.is_finite() && n >= *min && n <= *max => {}
                Some(n) => errors.push(FieldError {
                    field: rule.path.to_string(),
                    reason: format!("number {} outside [{}, {}]", n, min, max),
                }),
                None => errors.push(FieldError {
                    field: rule.path.to_string(),
                    reason: "expected a number".into(),
                }),
            },
            FieldKind::Bool => {
                if !value.is_boolean() {
                    errors.push(FieldError {
                        field: rule.path.to_string(),
                        reason: "expected a boolean".into(),
                    });
                }
            }
            FieldKind::Object => {
                if !value.is_object() {
                    errors.push(FieldError {
                        field: rule.path.to_string(),
                        reason: "expected an object".into(),
                    });
                }
            }
            FieldKind::Enum(allowed) => match value.as_str() {
                Some(s) if allowed.contains(&s) => {}
                _ => errors.push(FieldError {
                    field: rule.path.to_string(),
                    reason: format!("expected one of {:?}", allowed),
                }),
            },
        }
    }
    errors
}

/// Trims, strips markup-significant characters, and caps every string in
/// the payload, recursively.
fn sanitize_strings(data: &mut Value) {
    match data {
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | '&'))
                .take(SANITIZED_STRING_CAP)
                .collect();
            *s = cleaned;
        }
        Value::Array(items) => {
            for item in items {
                sanitize_strings(item);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                sanitize_strings(item);
            }
        }
        _ => {}
    }
}

/// Stamps the server clock when the client sent no timestamp.
fn stamp_timestamp(data: &mut Value, server_now_ms: u64) {
    if let Value::Object(map) = data {
        map.entry("timestamp")
            .or_insert_with(|| Value::from(server_now_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: u64 = 42_000;

    fn router() -> EventRouter {
        EventRouter::new(&GameConfig::default())
    }

    fn accepted(outcome: RouteOutcome) -> (ClientEvent, EventClass, bool) {
        match outcome {
            RouteOutcome::Accepted {
                event,
                class,
                requires_auth,
            } => (event, class, requires_auth),
            other => panic!("expected acceptance, got {:?}", other),
        }
    }

    fn invalid(outcome: RouteOutcome) -> ValidationErrorPayload {
        match outcome {
            RouteOutcome::Invalid(payload) => payload,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_authenticate_passes() {
        let outcome = router().route(
            json!({ "event": "authenticate", "data": { "playerId": "p1", "username": "alice" } }),
            NOW,
        );
        let (event, class, requires_auth) = accepted(outcome);
        assert_eq!(event.name(), "authenticate");
        assert_eq!(class, EventClass::General);
        assert!(!requires_auth);
    }

    #[test]
    fn test_missing_required_field_reported_by_name() {
        let outcome = router().route(
            json!({ "event": "authenticate", "data": { "playerId": "p1" } }),
            NOW,
        );
        let payload = invalid(outcome);
        assert_eq!(payload.errors.len(), 1);
        assert_eq!(payload.errors[0].field, "username");
    }

    #[test]
    fn test_string_length_cap() {
        let outcome = router().route(
            json!({ "event": "authenticate", "data": {
                "playerId": "p1", "username": "this-name-is-way-past-twenty-chars" } }),
            NOW,
        );
        let payload = invalid(outcome);
        assert_eq!(payload.errors[0].field, "username");
    }

    #[test]
    fn test_enum_violation() {
        let outcome = router().route(
            json!({ "event": "join_matchmaking", "data": { "gameMode": "blitz" } }),
            NOW,
        );
        let payload = invalid(outcome);
        assert_eq!(payload.errors[0].field, "gameMode");
    }

    #[test]
    fn test_nested_numeric_range() {
        let outcome = router().route(
            json!({ "event": "ball_update", "data": {
                "position": { "x": 99999.0, "y": 400.0 },
                "velocity": { "x": 0.0, "y": 0.0 },
                "timestamp": 1 } }),
            NOW,
        );
        let payload = invalid(outcome);
        assert!(payload.errors.iter().any(|e| e.field == "position.x"));
    }

    #[test]
    fn test_non_finite_number_refused() {
        // JSON cannot carry NaN directly, but a null where a number belongs
        // is the same class of garbage.
        let outcome = router().route(
            json!({ "event": "ping_latency", "data": { "clientTime": null } }),
            NOW,
        );
        let payload = invalid(outcome);
        assert_eq!(payload.errors[0].field, "clientTime");
    }

    #[test]
    fn test_unknown_event_is_malformed() {
        let outcome = router().route(json!({ "event": "rm_rf", "data": {} }), NOW);
        assert!(matches!(outcome, RouteOutcome::Malformed { .. }));
    }

    #[test]
    fn test_frame_without_event_is_malformed() {
        let outcome = router().route(json!({ "data": {} }), NOW);
        assert!(matches!(outcome, RouteOutcome::Malformed { .. }));
    }

    #[test]
    fn test_chat_sanitization_strips_markup() {
        let outcome = router().route(
            json!({ "event": "chat_message", "data": {
                "message": "  <script>alert('hi')</script> gg  ", "type": "all" } }),
            NOW,
        );
        let (event, class, _) = accepted(outcome);
        assert_eq!(class, EventClass::Chat);
        match event {
            ClientEvent::ChatMessage(p) => {
                assert!(!p.message.contains('<'));
                assert!(!p.message.contains('\''));
                assert!(p.message.ends_with("gg"));
            }
            _ => panic!("wrong event type"),
        }
    }

    #[test]
    fn test_timestamp_stamped_when_absent() {
        let outcome = router().route(
            json!({ "event": "player_movement", "data": { "keys": { "left": true } } }),
            NOW,
        );
        let (event, _, _) = accepted(outcome);
        match event {
            ClientEvent::PlayerMovement(p) => assert_eq!(p.timestamp, NOW),
            _ => panic!("wrong event type"),
        }
    }

    #[test]
    fn test_client_timestamp_preserved() {
        let outcome = router().route(
            json!({ "event": "player_input", "data": {
                "keys": { "right": true }, "timestamp": 123 } }),
            NOW,
        );
        let (event, class, _) = accepted(outcome);
        assert_eq!(class, EventClass::Movement);
        match event {
            ClientEvent::PlayerInput(p) => assert_eq!(p.timestamp, 123),
            _ => panic!("wrong event type"),
        }
    }

    #[test]
    fn test_resume_request_allows_empty_data() {
        let outcome = router().route(json!({ "event": "resume_request" }), NOW);
        let (event, _, requires_auth) = accepted(outcome);
        assert_eq!(event.name(), "resume_request");
        assert!(requires_auth);
    }

    #[test]
    fn test_request_game_end_reason_enum() {
        let outcome = router().route(
            json!({ "event": "request_game_end", "data": { "reason": "mutual_agreement" } }),
            NOW,
        );
        let (event, _, _) = accepted(outcome);
        assert_eq!(event.name(), "request_game_end");

        let bad = router().route(
            json!({ "event": "request_game_end", "data": { "reason": "rage" } }),
            NOW,
        );
        assert!(matches!(bad, RouteOutcome::Invalid(_)));
    }

    #[test]
    fn test_multiple_errors_reported_together() {
        let outcome = router().route(
            json!({ "event": "goal_attempt", "data": { "power": 400.0 } }),
            NOW,
        );
        let payload = invalid(outcome);
        // Missing position, out-of-range power, missing direction.
        assert!(payload.errors.len() >= 3);
    }
}
