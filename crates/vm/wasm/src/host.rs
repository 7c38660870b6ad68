// Path: crates/vm/wasm/src/host.rs
//! Host state and the capability table.
//!
//! The host exposes exactly three capabilities to guests: `emit_event`,
//! `read_clock`, and `read_counter`, all under the `env` module. Every
//! call passes through the per-execution gate; a rejected call records a
//! violation and traps the guest. There is no filesystem, no network, and
//! no ambient authority.

use artifex_api::vm::{
    CapabilityGate, CAPABILITY_EMIT_EVENT, CAPABILITY_READ_CLOCK, CAPABILITY_READ_COUNTER,
};
use std::collections::BTreeMap;
use wasmtime::{Caller, Linker};

/// Cap on guest-emitted events kept per execution.
const MAX_EVENTS: usize = 256;
/// Cap on a single emitted event payload in bytes.
const MAX_EVENT_LEN: usize = 4096;

/// Tracks linear-memory growth against the configured cap.
#[derive(Debug)]
pub struct MemoryGuard {
    cap: usize,
    peak: usize,
    exceeded: bool,
}

impl MemoryGuard {
    pub fn new(cap_bytes: u64) -> Self {
        Self {
            cap: cap_bytes as usize,
            peak: 0,
            exceeded: false,
        }
    }

    /// Peak observed linear memory in bytes.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Whether a growth request ran past the cap.
    pub fn exceeded(&self) -> bool {
        self.exceeded
    }

    /// Records an observed memory size outside of growth (initial pages).
    pub fn observe(&mut self, bytes: usize) {
        self.peak = self.peak.max(bytes);
    }
}

impl wasmtime::ResourceLimiter for HostCtx {
    fn memory_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired > self.memory.cap {
            self.memory.exceeded = true;
            return Ok(false);
        }
        self.memory.peak = self.memory.peak.max(desired);
        Ok(true)
    }

    fn table_growing(
        &mut self,
        _current: u32,
        _desired: u32,
        _maximum: Option<u32>,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Per-execution host state: the gate, collected events, and counters.
#[derive(Debug)]
pub struct HostCtx {
    pub gate: CapabilityGate,
    pub memory: MemoryGuard,
    pub events: Vec<String>,
    pub syscall_counts: BTreeMap<String, u64>,
    pub violation: Option<String>,
    counter: i64,
}

impl HostCtx {
    pub fn new(gate: CapabilityGate, memory_cap: u64) -> Self {
        Self {
            gate,
            memory: MemoryGuard::new(memory_cap),
            events: Vec::new(),
            syscall_counts: BTreeMap::new(),
            violation: None,
            counter: 0,
        }
    }

    /// Gate check shared by every host function. A denial records the
    /// violation and returns an error that traps the guest.
    fn admit(&mut self, capability: &'static str) -> anyhow::Result<()> {
        if !self.gate.permits(capability) {
            self.violation = Some(format!("capability {} denied by policy", capability));
            anyhow::bail!("capability {} denied", capability);
        }
        *self.syscall_counts.entry(capability.to_string()).or_insert(0) += 1;
        Ok(())
    }
}

/// Registers the capability table on the linker.
pub fn add_to_linker(linker: &mut Linker<HostCtx>) -> anyhow::Result<()> {
    linker.func_wrap(
        "env",
        "emit_event",
        |mut caller: Caller<'_, HostCtx>, ptr: i32, len: i32| -> anyhow::Result<()> {
            caller.data_mut().admit(CAPABILITY_EMIT_EVENT)?;
            let memory = caller
                .get_export("memory")
                .and_then(|e| e.into_memory())
                .ok_or_else(|| anyhow::anyhow!("guest exports no memory"))?;
            let len = (len as usize).min(MAX_EVENT_LEN);
            let mut buf = vec![0u8; len];
            memory
                .read(&caller, ptr as usize, &mut buf)
                .map_err(|e| anyhow::anyhow!("event read out of bounds: {}", e))?;
            let ctx = caller.data_mut();
            if ctx.events.len() < MAX_EVENTS {
                ctx.events.push(String::from_utf8_lossy(&buf).into_owned());
            }
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "read_clock",
        |mut caller: Caller<'_, HostCtx>| -> anyhow::Result<i64> {
            caller.data_mut().admit(CAPABILITY_READ_CLOCK)?;
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            Ok(now)
        },
    )?;

    linker.func_wrap(
        "env",
        "read_counter",
        |mut caller: Caller<'_, HostCtx>| -> anyhow::Result<i64> {
            caller.data_mut().admit(CAPABILITY_READ_COUNTER)?;
            let ctx = caller.data_mut();
            let value = ctx.counter;
            ctx.counter += 1;
            Ok(value)
        },
    )?;

    Ok(())
}
