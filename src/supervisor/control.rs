//! Control-plane messages exchanged between the supervisor and its workers.
//!
//! Messages travel as single JSON lines: supervisor to worker over the child's
//! stdin, worker to supervisor over the child's stdout. Worker stderr carries
//! log output and is left untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One control message, tagged by its `cmd` field on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum ControlMessage {
    /// Runtime logging reconfiguration. Applied by the receiving process and
    /// relayed to every worker except the one that raised it.
    #[serde(rename = "log")]
    LogConfig { config: Value },
    /// A worker noticed a plugin-set change and asks the supervisor to
    /// reconcile. Handled locally, never relayed.
    #[serde(rename = "checkPlugins")]
    PluginCheck,
    /// Plugin reconciliation began; suppresses further checks until the
    /// matching stop arrives. Handled locally, never relayed.
    #[serde(rename = "startPlugins")]
    PluginSyncStart,
    /// Plugin reconciliation finished.
    #[serde(rename = "endPlugins")]
    PluginSyncStop,
    /// Cross-process event broadcast, fanned out to every worker.
    #[serde(rename = "dispatch")]
    Broadcast {
        event: String,
        #[serde(default)]
        data: Value,
    },
}

/// Where a message received from one worker goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayTarget {
    /// Apply on the supervisor, then forward to all workers except the sender.
    AllExceptSender,
    /// Forward to every worker, sender included.
    AllWorkers,
    /// Supervisor-local bookkeeping only.
    LocalOnly,
    /// Drop without action.
    Ignore,
}

/// Relay classification for a worker-originated message.
#[must_use]
pub fn relay_target(message: &ControlMessage) -> RelayTarget {
    match message {
        ControlMessage::LogConfig { .. } => RelayTarget::AllExceptSender,
        ControlMessage::PluginCheck
        | ControlMessage::PluginSyncStart
        | ControlMessage::PluginSyncStop => RelayTarget::LocalOnly,
        // A broadcast with no event name has nothing to dispatch.
        ControlMessage::Broadcast { event, .. } if event.is_empty() => RelayTarget::Ignore,
        ControlMessage::Broadcast { .. } => RelayTarget::AllWorkers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape_log_config() {
        let msg = ControlMessage::LogConfig {
            config: json!({ "default": "debug" }),
        };
        let line = serde_json::to_string(&msg).unwrap();
        assert_eq!(line, r#"{"cmd":"log","config":{"default":"debug"}}"#);
        let back: ControlMessage = serde_json::from_str(&line).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_wire_shape_dispatch_defaults_data() {
        let back: ControlMessage =
            serde_json::from_str(r#"{"cmd":"dispatch","event":"/systemlogs"}"#).unwrap();
        assert_eq!(
            back,
            ControlMessage::Broadcast {
                event: "/systemlogs".to_string(),
                data: Value::Null,
            }
        );
    }

    #[test]
    fn test_wire_shape_unit_commands() {
        for (line, expected) in [
            (r#"{"cmd":"checkPlugins"}"#, ControlMessage::PluginCheck),
            (r#"{"cmd":"startPlugins"}"#, ControlMessage::PluginSyncStart),
            (r#"{"cmd":"endPlugins"}"#, ControlMessage::PluginSyncStop),
        ] {
            let back: ControlMessage = serde_json::from_str(line).unwrap();
            assert_eq!(back, expected);
        }
    }

    #[test]
    fn test_unknown_cmd_rejected() {
        assert!(serde_json::from_str::<ControlMessage>(r#"{"cmd":"halt"}"#).is_err());
    }

    #[test]
    fn test_relay_targets() {
        assert_eq!(
            relay_target(&ControlMessage::LogConfig { config: Value::Null }),
            RelayTarget::AllExceptSender
        );
        assert_eq!(
            relay_target(&ControlMessage::PluginCheck),
            RelayTarget::LocalOnly
        );
        assert_eq!(
            relay_target(&ControlMessage::Broadcast {
                event: "/i/apps".to_string(),
                data: json!({ "op": "create" }),
            }),
            RelayTarget::AllWorkers
        );
        assert_eq!(
            relay_target(&ControlMessage::Broadcast {
                event: String::new(),
                data: Value::Null,
            }),
            RelayTarget::Ignore
        );
    }
}
