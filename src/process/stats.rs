use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Resource usage of one backend process
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub memory_bytes: u64,
    pub cpu_percent: f32,
}

/// Best-effort resource sampler for running backends
pub struct ResourceSampler {
    system: Mutex<System>,
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Sample one process; `None` if it is not visible to the OS anymore.
    ///
    /// CPU usage is measured since the previous refresh of the same pid, so
    /// the first sample of a process reads as 0.
    pub fn sample(&self, pid: u32) -> Option<ResourceUsage> {
        let sys_pid = Pid::from_u32(pid);
        let mut system = self.system.lock();

        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::new().with_cpu().with_memory(),
        );

        system.process(sys_pid).map(|process| ResourceUsage {
            memory_bytes: process.memory(),
            cpu_percent: process.cpu_usage(),
        })
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}
