use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{AppServerId, InstanceId, ServerId};

/// One row from the instance collection API. Only `pk` is ever interpreted
/// by the controller layer; every other attribute is carried opaquely for
/// the view to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub pk: InstanceId,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl InstanceRecord {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Push notifications published on the `notification` channel. Kinds the
/// dashboard does not know about decode to `Unknown` and are dropped by the
/// consumer rather than treated as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    ServerUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_pk: Option<ServerId>,
    },
    OpenedxAppserverUpdate {
        appserver_id: AppServerId,
        instance_id: InstanceId,
    },
    #[serde(other)]
    Unknown,
}

/// Wire envelope for inbound channel frames: the channel names the message
/// was published to, plus the message payload itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEnvelope {
    #[serde(default)]
    pub channels: Vec<String>,
    pub data: ChannelMessage,
}

/// Outbound subscription request frame. `filter` is serialized even when
/// absent so the server sees an explicit null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeFrame {
    pub route: String,
    pub channel: String,
    pub filter: Option<Value>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
