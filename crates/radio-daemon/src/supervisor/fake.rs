//! In-memory supervisor for tests.  Records every operation, can be told to
//! fail any of them, and tracks how many processes of each program are alive
//! so tests can check the one-player/one-recorder invariant.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{LaunchSpec, ProcessExit, ProcessHandle, ProcessSupervisor};
use crate::error::{KillError, SignalError, SpawnError, WaitError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Spawn(u32),
    Interrupt(u32),
    Kill(u32),
    Reap(u32),
}

#[derive(Default)]
struct FakeState {
    next_pid: u32,
    ops: Vec<Op>,
    specs: Vec<LaunchSpec>,
    programs: HashMap<u32, String>,
    live: HashSet<u32>,
    terminated: HashSet<u32>,
    peak: HashMap<String, usize>,
    no_signals: bool,
    fail_spawn: bool,
    fail_interrupt: bool,
    fail_kill: bool,
    fail_reap: bool,
}

impl FakeState {
    fn live_of(&self, program: &str) -> usize {
        self.live
            .iter()
            .filter(|pid| self.programs.get(pid).map(String::as_str) == Some(program))
            .count()
    }
}

#[derive(Clone, Default)]
pub struct FakeSupervisor {
    state: Arc<Mutex<FakeState>>,
}

pub struct FakeProcess {
    pid: u32,
    program: String,
    reaped: bool,
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> Option<u32> {
        (!self.reaped).then_some(self.pid)
    }

    fn program(&self) -> &str {
        &self.program
    }
}

impl FakeSupervisor {
    /// A platform with interrupt signals.
    pub fn new() -> Self {
        Self::default()
    }

    /// A platform without signals (graceful termination degrades to kill).
    pub fn without_signals() -> Self {
        let sup = Self::default();
        sup.state.lock().unwrap().no_signals = true;
        sup
    }

    pub fn fail_spawns(&self, fail: bool) {
        self.state.lock().unwrap().fail_spawn = fail;
    }

    pub fn fail_interrupts(&self, fail: bool) {
        self.state.lock().unwrap().fail_interrupt = fail;
    }

    pub fn fail_kills(&self, fail: bool) {
        self.state.lock().unwrap().fail_kill = fail;
    }

    pub fn fail_reaps(&self, fail: bool) {
        self.state.lock().unwrap().fail_reap = fail;
    }

    /// Simulate a process exiting on its own.
    pub fn exit(&self, pid: u32) {
        self.state.lock().unwrap().terminated.insert(pid);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn specs(&self) -> Vec<LaunchSpec> {
        self.state.lock().unwrap().specs.clone()
    }

    /// Processes of `program` spawned and not yet reaped.
    pub fn live(&self, program: &str) -> usize {
        self.state.lock().unwrap().live_of(program)
    }

    /// Highest number of simultaneously live `program` processes seen.
    pub fn peak(&self, program: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .peak
            .get(program)
            .copied()
            .unwrap_or(0)
    }
}

fn fake_io_error(what: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("simulated {} failure", what))
}

#[async_trait]
impl ProcessSupervisor for FakeSupervisor {
    type Handle = FakeProcess;

    async fn spawn(&self, spec: &LaunchSpec) -> Result<FakeProcess, SpawnError> {
        let program = spec.program_name();
        let mut st = self.state.lock().unwrap();
        if st.fail_spawn {
            return Err(SpawnError::NotFound { program });
        }
        st.next_pid += 1;
        let pid = st.next_pid;
        st.ops.push(Op::Spawn(pid));
        st.specs.push(spec.clone());
        st.programs.insert(pid, program.clone());
        st.live.insert(pid);
        let live = st.live_of(&program);
        let peak = st.peak.entry(program.clone()).or_insert(0);
        *peak = (*peak).max(live);
        Ok(FakeProcess {
            pid,
            program,
            reaped: false,
        })
    }

    async fn force_kill(&self, handle: &mut FakeProcess) -> Result<(), KillError> {
        let mut st = self.state.lock().unwrap();
        st.ops.push(Op::Kill(handle.pid));
        if st.fail_kill {
            return Err(KillError::Kill {
                program: handle.program.clone(),
                pid: Some(handle.pid),
                source: fake_io_error("kill"),
            });
        }
        st.terminated.insert(handle.pid);
        Ok(())
    }

    fn interrupt(&self, handle: &mut FakeProcess) -> Result<(), SignalError> {
        let mut st = self.state.lock().unwrap();
        if st.no_signals {
            return Err(SignalError::Unsupported);
        }
        st.ops.push(Op::Interrupt(handle.pid));
        if st.fail_interrupt {
            return Err(SignalError::Delivery {
                pid: handle.pid,
                reason: "simulated".into(),
            });
        }
        st.terminated.insert(handle.pid);
        Ok(())
    }

    async fn reap(&self, handle: &mut FakeProcess) -> Result<ProcessExit, WaitError> {
        let mut st = self.state.lock().unwrap();
        st.ops.push(Op::Reap(handle.pid));
        st.live.remove(&handle.pid);
        handle.reaped = true;
        if st.fail_reap {
            return Err(WaitError {
                program: handle.program.clone(),
                pid: Some(handle.pid),
                source: fake_io_error("wait"),
            });
        }
        Ok(ProcessExit { code: None })
    }

    fn try_reap(&self, handle: &mut FakeProcess) -> Result<Option<ProcessExit>, WaitError> {
        let mut st = self.state.lock().unwrap();
        if st.terminated.contains(&handle.pid) {
            st.live.remove(&handle.pid);
            handle.reaped = true;
            return Ok(Some(ProcessExit { code: Some(1) }));
        }
        Ok(None)
    }
}
