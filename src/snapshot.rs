use serde::Serialize;

pub const UNKNOWN: &str = "Unknown";

/// One complete view of the router, produced once per successful poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub system_status: SystemStatus,
    pub resources: Resources,
    pub interfaces: Vec<InterfaceStat>,
    pub version: VersionInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub hostname: String,
    pub uptime: String,
    pub status: RouterStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterStatus {
    Running,
    Unknown,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resources {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub storage: StorageStats,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CpuStats {
    pub usage: u8,
    pub cores: u32,
    pub load: [f64; 3],
}

/// Memory figures in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub buffers: u64,
    pub cached: u64,
    /// `used - buffers - cached`; can go negative on odd router data.
    pub actual_used: i64,
}

/// Storage figures in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StorageStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceStat {
    pub name: String,
    pub status: LinkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    pub build_date: String,
    pub architecture: String,
}

impl SystemStatus {
    pub fn unknown() -> Self {
        Self {
            hostname: UNKNOWN.to_string(),
            uptime: UNKNOWN.to_string(),
            status: RouterStatus::Unknown,
        }
    }
}

impl VersionInfo {
    pub fn unknown() -> Self {
        Self {
            version: UNKNOWN.to_string(),
            build_date: UNKNOWN.to_string(),
            architecture: UNKNOWN.to_string(),
        }
    }
}

impl Snapshot {
    /// Snapshot served when the real API is disabled: zeros, "Unknown", no interfaces.
    pub fn placeholder() -> Self {
        Self {
            system_status: SystemStatus::unknown(),
            resources: Resources {
                cpu: CpuStats::default(),
                memory: MemoryStats::default(),
                storage: StorageStats::default(),
            },
            interfaces: Vec::new(),
            version: VersionInfo::unknown(),
        }
    }

    pub fn memory_usage_percent(&self) -> f64 {
        let memory = &self.resources.memory;
        if memory.total == 0 {
            return 0.0;
        }
        memory.actual_used as f64 / memory.total as f64 * 100.0
    }
}
