// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Multi-domain clock scheduling.
//!
//! Each [`ClockDomain`] toggles one module's clock input with configurable
//! high/low phase durations. The [`ClockScheduler`] advances all domains by
//! the minimum time-to-next-edge across the set, so relative phase between
//! domains stays exact without ever requiring sub-unit time steps, provided
//! all periods are expressed in the same integer unit.

use std::any::Any;
use std::marker::PhantomData;

use indexmap::IndexMap;
use thiserror::Error;

/// A digital module driven by a clock domain.
///
/// The module recomputes its outputs from its current inputs in [`eval`],
/// like a Verilated model's `eval()`. Sequential logic keys off the clock
/// level set by [`set_clock`].
///
/// [`eval`]: ClockedModule::eval
/// [`set_clock`]: ClockedModule::set_clock
pub trait ClockedModule: Any {
    /// Drive the module's clock input.
    fn set_clock(&mut self, level: bool);
    /// Recompute outputs from current inputs.
    fn eval(&mut self);
}

/// Clock domain configuration or registration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    /// Both phase durations are zero: the domain could never schedule an edge.
    #[error("clock domain '{name}' has zero high and low periods")]
    UnschedulableDomain { name: String },
    /// A domain with this name is already registered.
    #[error("clock domain '{name}' is already registered")]
    DuplicateDomain { name: String },
}

/// Typed handle to a module registered with a [`ClockScheduler`].
///
/// Handles are minted by [`ClockScheduler::add_domain`] and are only
/// meaningful for the scheduler that produced them.
pub struct ModuleHandle<M> {
    index: usize,
    _marker: PhantomData<fn() -> M>,
}

impl<M> Clone for ModuleHandle<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for ModuleHandle<M> {}

impl<M> std::fmt::Debug for ModuleHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("index", &self.index)
            .finish()
    }
}

/// One clock domain: a toggle schedule for a single module.
///
/// The domain holds only the index of its module in the scheduler's arena;
/// the module itself is threaded in by the scheduler on each call.
#[derive(Debug)]
pub struct ClockDomain {
    name: String,
    high_period: u32,
    low_period: u32,
    is_high: bool,
    elapsed: u32,
    module: usize,
}

/// Iteration cap for skipping zero-length phases inside one tick.
/// Construction-time validation makes exceeding it impossible.
const ZERO_PHASE_RETICKS: u32 = 4;

impl ClockDomain {
    fn new(
        name: &str,
        high_period: u32,
        low_period: u32,
        start_high: bool,
        module: usize,
    ) -> Result<Self, ClockError> {
        if high_period == 0 && low_period == 0 {
            return Err(ClockError::UnschedulableDomain { name: name.to_string() });
        }
        let mut domain = ClockDomain {
            name: name.to_string(),
            high_period,
            low_period,
            is_high: start_high,
            elapsed: 0,
            module,
        };
        // Never rest in a zero-length phase: start in the opposite one.
        if domain.current_period() == 0 {
            domain.is_high = !domain.is_high;
        }
        Ok(domain)
    }

    /// Domain name, as registered.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current clock level.
    pub fn is_high(&self) -> bool {
        self.is_high
    }

    /// Duration of the phase the clock is currently in.
    pub fn current_period(&self) -> u32 {
        if self.is_high {
            self.high_period
        } else {
            self.low_period
        }
    }

    /// Time until this domain's next edge. An overshot domain reports
    /// `u32::MAX`: it no longer schedules and stalls instead of corrupting
    /// phase alignment across the set.
    pub fn time_to_next_edge(&self) -> u32 {
        let period = self.current_period();
        if self.elapsed > period {
            u32::MAX
        } else {
            period - self.elapsed
        }
    }

    /// Flip the clock level, drive the module and re-evaluate it.
    ///
    /// A zero-length new phase ticks again immediately so it can never
    /// stall the scheduler.
    fn tick(&mut self, module: &mut dyn ClockedModule) {
        for _ in 0..ZERO_PHASE_RETICKS {
            self.is_high = !self.is_high;
            self.elapsed = 0;
            module.set_clock(self.is_high);
            module.eval();
            if self.current_period() != 0 {
                return;
            }
        }
        panic!("clock domain '{}' has no schedulable phase", self.name);
    }

    /// Advance this domain by `delta` time units, ticking if the current
    /// phase completes. Overshooting the phase is an internal scheduling
    /// defect: it is reported as a diagnostic and never silently corrected.
    fn advance(&mut self, delta: u32, module: &mut dyn ClockedModule) {
        self.elapsed = self.elapsed.saturating_add(delta);
        let period = self.current_period();
        if self.elapsed == period {
            self.tick(module);
        } else if self.elapsed > period {
            clilog::warn!(
                "clock domain '{}' overshot its {} phase by {} units",
                self.name,
                if self.is_high { "high" } else { "low" },
                self.elapsed - period
            );
        }
    }
}

/// Scheduler over a set of clock domains and the modules they drive.
///
/// `advance()` always moves every domain by the same globally-minimal
/// delta, so exactly one domain (or more, if tied) edges per call and no
/// domain ever skips an edge.
#[derive(Default)]
pub struct ClockScheduler {
    domains: IndexMap<String, ClockDomain>,
    modules: Vec<Box<dyn ClockedModule>>,
}

impl ClockScheduler {
    pub fn new() -> Self {
        ClockScheduler {
            domains: IndexMap::new(),
            modules: Vec::new(),
        }
    }

    /// Register a module under a new clock domain.
    ///
    /// `high_period` and `low_period` are the phase durations (not both
    /// zero); a zero-length phase is legal and is skipped atomically at
    /// tick time, giving a full clock cycle per edge. `start_high` picks
    /// the phase the clock starts in.
    pub fn add_domain<M: ClockedModule>(
        &mut self,
        name: &str,
        module: M,
        high_period: u32,
        low_period: u32,
        start_high: bool,
    ) -> Result<ModuleHandle<M>, ClockError> {
        if self.domains.contains_key(name) {
            return Err(ClockError::DuplicateDomain { name: name.to_string() });
        }
        let index = self.modules.len();
        let domain = ClockDomain::new(name, high_period, low_period, start_high, index)?;
        self.modules.push(Box::new(module));
        self.domains.insert(name.to_string(), domain);
        Ok(ModuleHandle { index, _marker: PhantomData })
    }

    /// Advance simulation time by the minimum time-to-next-edge across all
    /// domains, ticking every domain that reaches its edge. Returns the
    /// delta advanced.
    pub fn advance(&mut self) -> u32 {
        debug_assert!(!self.domains.is_empty(), "advancing an empty scheduler");
        let min_time = self
            .domains
            .values()
            .map(ClockDomain::time_to_next_edge)
            .min()
            .unwrap_or(0);
        if min_time == u32::MAX {
            // Every domain overshot; nothing left to schedule.
            return 0;
        }
        let modules = &mut self.modules;
        for domain in self.domains.values_mut() {
            domain.advance(min_time, modules[domain.module].as_mut());
        }
        min_time
    }

    /// Borrow a registered module through its typed handle.
    pub fn module<M: ClockedModule>(&self, handle: ModuleHandle<M>) -> &M {
        let module: &dyn Any = self.modules[handle.index].as_ref();
        module.downcast_ref().expect("module handle type mismatch")
    }

    /// Mutably borrow a registered module through its typed handle.
    pub fn module_mut<M: ClockedModule>(&mut self, handle: ModuleHandle<M>) -> &mut M {
        let module: &mut dyn Any = self.modules[handle.index].as_mut();
        module.downcast_mut().expect("module handle type mismatch")
    }

    /// Look up a domain by name (diagnostics and tests).
    pub fn domain(&self, name: &str) -> Option<&ClockDomain> {
        self.domains.get(name)
    }

    pub fn num_domains(&self) -> usize {
        self.domains.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every clock edge it receives, with the scheduler time at
    /// which it arrived (accumulated by the test).
    struct EdgeRecorder {
        level: bool,
        posedges: u32,
        negedges: u32,
    }

    impl EdgeRecorder {
        fn new() -> Self {
            EdgeRecorder { level: false, posedges: 0, negedges: 0 }
        }
    }

    impl ClockedModule for EdgeRecorder {
        fn set_clock(&mut self, level: bool) {
            self.level = level;
        }
        fn eval(&mut self) {
            if self.level {
                self.posedges += 1;
            } else {
                self.negedges += 1;
            }
        }
    }

    #[test]
    fn test_rejects_dual_zero_periods() {
        let mut scheduler = ClockScheduler::new();
        let err = scheduler
            .add_domain("bad", EdgeRecorder::new(), 0, 0, true)
            .unwrap_err();
        assert_eq!(err, ClockError::UnschedulableDomain { name: "bad".to_string() });
    }

    #[test]
    fn test_rejects_duplicate_name() {
        let mut scheduler = ClockScheduler::new();
        scheduler.add_domain("clk", EdgeRecorder::new(), 1, 1, true).unwrap();
        let err = scheduler
            .add_domain("clk", EdgeRecorder::new(), 2, 2, true)
            .unwrap_err();
        assert_eq!(err, ClockError::DuplicateDomain { name: "clk".to_string() });
    }

    #[test]
    fn test_symmetric_cadence() {
        // (3, 2) phases: edges at t = 3, 5, 8, 10, 13, 15, ...
        let mut scheduler = ClockScheduler::new();
        let h = scheduler.add_domain("clk", EdgeRecorder::new(), 3, 2, true).unwrap();
        let mut edges = Vec::new();
        let mut t = 0u32;
        for _ in 0..6 {
            t += scheduler.advance();
            edges.push((t, scheduler.domain("clk").unwrap().is_high()));
        }
        assert_eq!(
            edges,
            vec![(3, false), (5, true), (8, false), (10, true), (13, false), (15, true)]
        );
        let recorder = scheduler.module(h);
        assert_eq!(recorder.posedges, 3);
        assert_eq!(recorder.negedges, 3);
    }

    #[test]
    fn test_zero_low_phase_gives_full_cycle_per_advance() {
        let mut scheduler = ClockScheduler::new();
        let h = scheduler.add_domain("pixel", EdgeRecorder::new(), 1, 0, true).unwrap();
        for _ in 0..10 {
            assert_eq!(scheduler.advance(), 1);
        }
        let recorder = scheduler.module(h);
        assert_eq!(recorder.posedges, 10);
        assert_eq!(recorder.negedges, 10);
    }

    #[test]
    fn test_multi_domain_lockstep_ratio() {
        // A 1-unit pixel clock against a 4-unit divided clock: after 8
        // advances the fast domain has seen 8 full cycles, the slow one 2.
        let mut scheduler = ClockScheduler::new();
        let fast = scheduler.add_domain("pixel", EdgeRecorder::new(), 1, 0, true).unwrap();
        let slow = scheduler.add_domain("host", EdgeRecorder::new(), 4, 0, true).unwrap();
        for _ in 0..8 {
            assert_eq!(scheduler.advance(), 1);
        }
        assert_eq!(scheduler.module(fast).posedges, 8);
        assert_eq!(scheduler.module(slow).posedges, 2);
    }

    #[test]
    fn test_tied_domains_edge_together() {
        let mut scheduler = ClockScheduler::new();
        let a = scheduler.add_domain("a", EdgeRecorder::new(), 2, 2, true).unwrap();
        let b = scheduler.add_domain("b", EdgeRecorder::new(), 2, 2, false).unwrap();
        // Both domains are due every 2 units; each advance moves both.
        assert_eq!(scheduler.advance(), 2);
        assert_eq!(scheduler.module(a).posedges + scheduler.module(a).negedges, 1);
        assert_eq!(scheduler.module(b).posedges + scheduler.module(b).negedges, 1);
    }

    #[test]
    fn test_module_access_through_handle() {
        let mut scheduler = ClockScheduler::new();
        let h = scheduler.add_domain("clk", EdgeRecorder::new(), 1, 1, true).unwrap();
        scheduler.module_mut(h).posedges = 41;
        scheduler.module_mut(h).posedges += 1;
        assert_eq!(scheduler.module(h).posedges, 42);
    }
}
