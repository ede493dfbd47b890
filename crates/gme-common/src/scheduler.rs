//! Init/play call scheduling for guest music drivers.
//!
//! Music files for these machines ship a driver with an init routine, called
//! once per track, and a play routine, called at a fixed rate. Calls use the
//! jsr-then-stop convention: the return address pushed for every call is the
//! machine's idle address, whose byte is the CPU's halt opcode, so the CPU
//! stops there as soon as the routine returns.
//!
//! [`PlayScheduler`] runs the CPU between play deadlines, detects returns,
//! and fires the play routine. An init routine that keeps running past a
//! few deadlines is suspended: its registers are kept in a
//! [`SuspendedCall`], play runs, and init resumes once play returns.

use crate::{Time, WarningSlot};

/// CPU-level operations the scheduler needs from a machine.
pub trait GuestMachine {
    /// Register snapshot taken when a routine is suspended.
    type Snapshot;

    /// CPU clock within the current frame.
    fn cpu_time(&self) -> Time;

    /// Move the CPU clock to `time`.
    fn set_cpu_time(&mut self, time: Time);

    /// Shift the CPU clock by `delta` at frame end.
    fn adjust_cpu_time(&mut self, delta: Time);

    /// Run the CPU until `end`; `true` when it stopped on a halt opcode.
    fn run_cpu(&mut self, end: Time) -> bool;

    /// Current program counter.
    fn pc(&self) -> u16;

    /// Address of the halt byte that all guest calls return to.
    fn idle_addr(&self) -> u16;

    /// Capture the registers of the running routine.
    fn snapshot(&self) -> Self::Snapshot;

    /// Reinstate registers captured by [`snapshot`](Self::snapshot).
    fn restore(&mut self, snapshot: Self::Snapshot);

    /// Start the play routine so that it returns to the idle address.
    fn call_play(&mut self);
}

/// Which guest routine a call frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Per-track initialisation.
    Init,
    /// Periodic play routine.
    Play,
}

/// Registers of a routine interrupted by a play call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspendedCall<S> {
    /// Routine that was interrupted.
    pub kind: CallKind,
    /// Its registers at the moment of interruption.
    pub regs: S,
}

/// Deadlines a routine may run past before play interrupts it.
pub const DEFAULT_MAX_OVERDUE: u32 = 4;

/// Periodic play caller with suspend/resume of long-running routines.
#[derive(Debug, Clone)]
pub struct PlayScheduler<S> {
    base_period: Time,
    play_period: Time,
    next_play: Time,
    play_pending: bool,
    overdue: u32,
    max_overdue: u32,
    running: Option<CallKind>,
    suspended: Option<SuspendedCall<S>>,
    play_calls: u64,
    stray_halts: u32,
    interruptions: u32,
    warning: WarningSlot,
}

impl<S> PlayScheduler<S> {
    /// Scheduler calling play every `period` clocks.
    pub fn new(period: Time) -> Self {
        let period = period.max(1);
        Self {
            base_period: period,
            play_period: period,
            next_play: 0,
            play_pending: false,
            overdue: 0,
            max_overdue: DEFAULT_MAX_OVERDUE,
            running: None,
            suspended: None,
            play_calls: 0,
            stray_halts: 0,
            interruptions: 0,
            warning: WarningSlot::new(),
        }
    }

    /// Change the untempo'd play period, keeping the current tempo.
    pub fn set_period(&mut self, period: Time) {
        let tempo = self.base_period as f64 / self.play_period as f64;
        self.base_period = period.max(1);
        self.set_tempo(tempo);
    }

    /// Scale the play rate; 2.0 calls play twice as often.
    pub fn set_tempo(&mut self, tempo: f64) {
        let tempo = if tempo.is_finite() && tempo > 0.0 { tempo } else { 1.0 };
        self.play_period = ((self.base_period as f64 / tempo) as Time).max(1);
    }

    /// Clocks between play calls, after tempo.
    pub fn play_period(&self) -> Time {
        self.play_period
    }

    /// Clock of the next play deadline in the current frame.
    pub fn next_play(&self) -> Time {
        self.next_play
    }

    /// Limit of deadlines an init routine may miss before being suspended.
    pub fn set_max_overdue(&mut self, limit: u32) {
        self.max_overdue = limit;
    }

    /// Play routine calls since the track started.
    pub fn play_calls(&self) -> u64 {
        self.play_calls
    }

    /// Routine the CPU is currently executing, if any.
    pub fn running(&self) -> Option<CallKind> {
        self.running
    }

    /// Routine waiting to resume after the current play call.
    pub fn suspended(&self) -> Option<&SuspendedCall<S>> {
        self.suspended.as_ref()
    }

    /// Times a running routine was suspended for a play call.
    pub fn interruptions(&self) -> u32 {
        self.interruptions
    }

    /// Halts hit away from the idle address since the track started.
    pub fn stray_halts(&self) -> u32 {
        self.stray_halts
    }

    /// Latest scheduling anomaly, cleared by reading.
    pub fn take_warning(&mut self) -> Option<String> {
        self.warning.take()
    }

    /// Forget all call state; the machine has just entered init.
    ///
    /// The first play deadline is at clock 0 of the next frame and is
    /// honoured as soon as init returns.
    pub fn start(&mut self) {
        self.next_play = 0;
        self.play_pending = false;
        self.overdue = 0;
        self.running = Some(CallKind::Init);
        self.suspended = None;
        self.play_calls = 0;
        self.stray_halts = 0;
        self.interruptions = 0;
        self.warning.clear();
    }

    /// Emulate up to `end` and rebase all clocks so `end` becomes 0.
    pub fn end_frame<M>(&mut self, machine: &mut M, end: Time)
    where
        M: GuestMachine<Snapshot = S>,
    {
        while machine.cpu_time() < end {
            self.run_once(machine, end);
        }
        self.next_play -= end;
        if self.next_play < 0 {
            log::warn!("play deadline {} behind frame start", self.next_play);
            self.next_play = 0;
        }
        machine.adjust_cpu_time(-end);
    }

    fn run_once<M>(&mut self, machine: &mut M, end: Time)
    where
        M: GuestMachine<Snapshot = S>,
    {
        let target = self.next_play.min(end);
        if machine.cpu_time() < target && machine.run_cpu(target) {
            if machine.pc() != machine.idle_addr() {
                self.stray_halts += 1;
                if self.stray_halts == 1 {
                    self.warning
                        .set(format!("illegal instruction at 0x{:04X}", machine.pc()));
                }
                machine.set_cpu_time(target);
                return;
            }
            self.running = None;
            if let Some(frame) = self.suspended.take() {
                log::trace!("resuming {:?} routine", frame.kind);
                machine.restore(frame.regs);
                self.running = Some(frame.kind);
                // A routine that needed interrupting once gets interrupted
                // at every following deadline.
                self.overdue = self.max_overdue;
            } else if self.play_pending {
                self.fire_play(machine);
            } else {
                machine.set_cpu_time(target);
            }
        }

        if machine.cpu_time() >= self.next_play && self.next_play < end {
            self.next_play += self.play_period;
            let idle = self.suspended.is_none() && machine.pc() == machine.idle_addr();
            if idle {
                self.fire_play(machine);
            } else {
                self.play_pending = true;
                self.overdue += 1;
                if self.overdue > self.max_overdue && self.suspended.is_none() {
                    let kind = self.running.unwrap_or(CallKind::Init);
                    self.suspended = Some(SuspendedCall {
                        kind,
                        regs: machine.snapshot(),
                    });
                    self.interruptions += 1;
                    if self.interruptions == 1 {
                        self.warning.set(match kind {
                            CallKind::Init => "play called during init",
                            CallKind::Play => "play called during play",
                        });
                    } else {
                        log::trace!("{kind:?} routine interrupted again");
                    }
                    self.fire_play(machine);
                }
            }
        }
    }

    fn fire_play<M>(&mut self, machine: &mut M)
    where
        M: GuestMachine<Snapshot = S>,
    {
        self.play_pending = false;
        self.overdue = 0;
        self.play_calls += 1;
        self.running = Some(CallKind::Play);
        machine.call_play();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: u16 = 0xF000;
    const PLAY: u16 = 0x2000;

    /// Toy guest: a call runs for a fixed number of clocks and then lands
    /// on `IDLE`; `halt_at` marks an address that halts in place.
    struct Toy {
        time: Time,
        pc: u16,
        remaining: Time,
        play_cost: Time,
        halt_at: Option<u16>,
    }

    impl Toy {
        fn new(init_cost: Time, play_cost: Time) -> Self {
            Self {
                time: 0,
                pc: 0x1000,
                remaining: init_cost,
                play_cost,
                halt_at: None,
            }
        }
    }

    impl GuestMachine for Toy {
        type Snapshot = (u16, Time);

        fn cpu_time(&self) -> Time {
            self.time
        }
        fn set_cpu_time(&mut self, time: Time) {
            self.time = time;
        }
        fn adjust_cpu_time(&mut self, delta: Time) {
            self.time += delta;
        }
        fn run_cpu(&mut self, end: Time) -> bool {
            if Some(self.pc) == self.halt_at || self.pc == IDLE {
                return true;
            }
            let step = self.remaining.min(end - self.time);
            self.time += step;
            self.remaining -= step;
            if self.remaining == 0 {
                self.pc = IDLE;
                return true;
            }
            false
        }
        fn pc(&self) -> u16 {
            self.pc
        }
        fn idle_addr(&self) -> u16 {
            IDLE
        }
        fn snapshot(&self) -> (u16, Time) {
            (self.pc, self.remaining)
        }
        fn restore(&mut self, (pc, remaining): (u16, Time)) {
            self.pc = pc;
            self.remaining = remaining;
        }
        fn call_play(&mut self) {
            self.pc = PLAY;
            self.remaining = self.play_cost;
        }
    }

    #[test]
    fn one_play_call_per_period() {
        let mut toy = Toy::new(10, 20);
        let mut sched = PlayScheduler::new(1000);
        sched.start();
        for frame in 1..=60 {
            sched.end_frame(&mut toy, 1000);
            assert_eq!(sched.play_calls(), frame);
            assert_eq!(toy.pc(), IDLE);
            assert_eq!(toy.cpu_time(), 0);
        }
        assert!(sched.take_warning().is_none());
    }

    #[test]
    fn frame_length_independent_of_period() {
        let mut toy = Toy::new(10, 20);
        let mut sched = PlayScheduler::new(300);
        sched.start();
        for _ in 0..10 {
            sched.end_frame(&mut toy, 1000);
        }
        // Deadlines at 0, 300, ..., 9900.
        assert_eq!(sched.play_calls(), 34);
    }

    #[test]
    fn slow_init_delays_first_play() {
        let mut toy = Toy::new(2500, 20);
        let mut sched = PlayScheduler::new(1000);
        sched.start();
        sched.end_frame(&mut toy, 1000);
        assert_eq!(sched.play_calls(), 0);
        sched.end_frame(&mut toy, 1000);
        assert_eq!(sched.play_calls(), 0);
        sched.end_frame(&mut toy, 1000);
        // Init returned at 2500 and the pending call fired right away.
        assert_eq!(sched.play_calls(), 1);
        assert!(sched.suspended().is_none());
        assert!(sched.take_warning().is_none());
    }

    #[test]
    fn endless_init_is_suspended_and_resumed() {
        let mut toy = Toy::new(Time::MAX / 2, 20);
        let mut sched = PlayScheduler::new(1000);
        sched.set_max_overdue(2);
        sched.start();
        for _ in 0..3 {
            sched.end_frame(&mut toy, 1000);
        }
        assert_eq!(sched.play_calls(), 1);
        assert_eq!(sched.take_warning().as_deref(), Some("play called during init"));
        // Play returned and init resumed where it left off.
        assert_eq!(toy.pc(), 0x1000);
        assert_eq!(sched.running(), Some(CallKind::Init));
        assert!(sched.suspended().is_none());

        // From now on every deadline interrupts init, warning only once.
        sched.end_frame(&mut toy, 1000);
        sched.end_frame(&mut toy, 1000);
        assert_eq!(sched.play_calls(), 3);
        assert_eq!(sched.interruptions(), 3);
        assert!(sched.take_warning().is_none());
        assert_eq!(toy.pc(), 0x1000);
    }

    #[test]
    fn stray_halt_warns_once_and_time_advances() {
        let mut toy = Toy::new(10, 20);
        toy.halt_at = Some(0x1000);
        let mut sched = PlayScheduler::new(1000);
        sched.start();
        for _ in 0..4 {
            sched.end_frame(&mut toy, 1000);
            assert_eq!(toy.cpu_time(), 0);
        }
        assert!(sched.stray_halts() > 1);
        assert_eq!(
            sched.take_warning().as_deref(),
            Some("illegal instruction at 0x1000")
        );
        assert!(sched.take_warning().is_none());
    }

    #[test]
    fn tempo_scales_period() {
        let mut sched: PlayScheduler<()> = PlayScheduler::new(1000);
        sched.set_tempo(2.0);
        assert_eq!(sched.play_period(), 500);
        sched.set_period(3000);
        assert_eq!(sched.play_period(), 1500);
        sched.set_tempo(-1.0);
        assert_eq!(sched.play_period(), 3000);
    }
}
