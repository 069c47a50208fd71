use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub schema_version: u32,
    /// Settings applied to every router that does not override them.
    #[serde(default)]
    pub defaults: Option<RouterSettingsSpec>,
    pub routers: Vec<RouterSpec>,
    #[serde(default)]
    pub clients: Vec<ClientSpec>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouterSettingsSpec {
    #[serde(default)]
    pub max_in_flight: Option<u32>,
    #[serde(default)]
    pub link_capacity: Option<u32>,
    /// One-way latency of connections opened by this router (microseconds).
    #[serde(default)]
    pub link_latency_us: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSpec {
    pub name: String,
    #[serde(default)]
    pub settings: Option<RouterSettingsSpec>,
    #[serde(default)]
    pub connectors: Vec<ConnectorSpec>,
    #[serde(default)]
    pub link_route_patterns: Vec<LinkRoutePatternSpec>,
    #[serde(default)]
    pub fixed_addresses: Vec<FixedAddressSpec>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorRole {
    InterRouter,
    OnDemand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorSpec {
    /// Inter-router connectors may stay anonymous; link-route targets need a name.
    #[serde(default)]
    pub name: Option<String>,
    pub role: ConnectorRole,
    /// Name of the router at the other end.
    pub peer: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternDirSpec {
    In,
    Out,
    #[default]
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRoutePatternSpec {
    pub prefix: String,
    #[serde(default)]
    pub dir: PatternDirSpec,
    #[serde(default)]
    pub connector: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FanoutSpec {
    Single,
    Multiple,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BiasSpec {
    Closest,
    Spread,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedAddressSpec {
    pub prefix: String,
    pub fanout: FanoutSpec,
    #[serde(default)]
    pub bias: Option<BiasSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSpec {
    pub name: String,
    /// Router whose normal listener the client connects to.
    pub router: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoleSpec {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSpec {
    Attach {
        client: String,
        link: String,
        role: RoleSpec,
        address: String,
        /// Credit a receiver keeps topped up.
        #[serde(default)]
        prefetch: Option<u32>,
    },
    Send {
        client: String,
        link: String,
        body: String,
        /// Sends are pre-settled (at-most-once) unless asked otherwise.
        #[serde(default)]
        unsettled: bool,
    },
    Detach {
        client: String,
        link: String,
    },
    /// Drop the connection between `router` and `peer`.
    Disconnect {
        router: String,
        peer: String,
    },
    Reconnect {
        router: String,
        peer: String,
    },
}
