//! Per-event process and system resource usage

use serde_json::{json, Value};
use sysinfo::{Pid, System};

use crate::integration::Integration;
use crate::record::Record;

/// Attaches a resource-usage snapshot to every record: how much memory,
/// CPU and IO the failing process was consuming at capture time.
pub struct ResourcesIntegration;

impl ResourcesIntegration {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ResourcesIntegration {
    fn default() -> Self {
        Self::new()
    }
}

impl Integration for ResourcesIntegration {
    fn name(&self) -> &'static str {
        "resources"
    }

    fn gather(&self, _record: &dyn Record) -> anyhow::Result<Option<Value>> {
        let system = System::new_all();
        let load = System::load_average();

        let mut data = json!({
            "system": {
                "total_memory": system.total_memory(),
                "used_memory": system.used_memory(),
                "total_swap": system.total_swap(),
                "used_swap": system.used_swap(),
                "cpus": system.cpus().len(),
                "load_average": [load.one, load.five, load.fifteen],
            },
        });

        let pid = Pid::from(std::process::id() as usize);
        if let Some(process) = system.process(pid) {
            let disk = process.disk_usage();
            data["self_usage"] = json!({
                "memory": process.memory(),
                "virtual_memory": process.virtual_memory(),
                "cpu_usage_percent": process.cpu_usage(),
                "run_time_seconds": process.run_time(),
                "disk_read_bytes": disk.total_read_bytes,
                "disk_written_bytes": disk.total_written_bytes,
            });
        }

        Ok(Some(data))
    }

    fn session_data(&self) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }
}
