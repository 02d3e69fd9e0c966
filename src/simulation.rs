/// The dispatch loop.
///
/// Pops the earliest event, moves the clock to its timestamp and hands it
/// to one [`EventHandler`]. Single-threaded: a policy call inside a
/// handler holds up the whole run, which is what keeps runs reproducible.

use crate::event::{Event, EventId, EventType};
use crate::scheduler::Scheduler;
use crate::time::VirtualTime;

// ── Handler trait ─────────────────────────────────────────────────────

/// Receives every dispatched event and may schedule follow-ups through
/// the context.
pub trait EventHandler {
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event);
}

/// Closures work as handlers, which keeps kernel tests short.
impl<F> EventHandler for F
where
    F: FnMut(&mut SimulationContext, &Event),
{
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) {
        (self)(ctx, event);
    }
}

// ── Simulation Context ───────────────────────────────────────────────

/// What a handler sees while one event is being dispatched: the clock
/// and a scheduling API that refuses to go back in time.
pub struct SimulationContext<'a> {
    scheduler: &'a mut Scheduler,
    now: VirtualTime,
}

impl<'a> SimulationContext<'a> {
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Schedule `payload` at absolute time `at`.
    ///
    /// # Panics
    /// If `at` is earlier than [`now`](Self::now).
    pub fn schedule_at(&mut self, at: VirtualTime, payload: EventType) -> EventId {
        assert!(
            at >= self.now,
            "cannot schedule into the past: now={}, at={}",
            self.now,
            at
        );
        self.scheduler.schedule(at, payload)
    }

    /// Schedule `payload` `delay` time units from now.
    ///
    /// # Panics
    /// On a negative or non-finite delay. Latencies and processing delays
    /// are validated at load time.
    pub fn schedule_after(&mut self, delay: f64, payload: EventType) -> EventId {
        let at = self
            .now
            .plus(delay)
            .expect("delay must be finite and non-negative");
        self.scheduler.schedule(at, payload)
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }
}

// ── Simulation ────────────────────────────────────────────────────────

/// Owns the pending events and the clock.
///
/// [`run`](Self::run) drains the queue, [`step`](Self::step) dispatches
/// one event and [`run_until`](Self::run_until) stops at a time horizon.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    scheduler: Scheduler,
    current_time: VirtualTime,
    events_processed: u64,
}

impl Simulation {
    pub fn new() -> Self {
        Simulation {
            scheduler: Scheduler::new(),
            current_time: VirtualTime::ZERO,
            events_processed: 0,
        }
    }

    pub fn current_time(&self) -> VirtualTime {
        self.current_time
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Seed the queue from outside a handler, typically before running.
    pub fn schedule(&mut self, at: VirtualTime, payload: EventType) -> EventId {
        self.scheduler.schedule(at, payload)
    }

    /// Dispatch the earliest event. `None` once the queue is empty.
    pub fn step(&mut self, handler: &mut dyn EventHandler) -> Option<Event> {
        let event = self.scheduler.pop_next()?;
        assert!(
            event.scheduled_at >= self.current_time,
            "clock would run backwards: now={}, event at {}",
            self.current_time,
            event.scheduled_at
        );
        self.current_time = event.scheduled_at;
        self.events_processed += 1;
        tracing::trace!(
            id = %event.id,
            at = %event.scheduled_at,
            packet = ?event.payload.packet(),
            payload = %event.payload,
            "dispatch"
        );

        let mut ctx = SimulationContext {
            scheduler: &mut self.scheduler,
            now: self.current_time,
        };
        handler.handle(&mut ctx, &event);
        Some(event)
    }

    /// Dispatch until the queue is empty; returns the number of events
    /// handled by this call.
    pub fn run(&mut self, handler: &mut dyn EventHandler) -> u64 {
        let start = self.events_processed;
        while self.step(handler).is_some() {}
        self.events_processed - start
    }

    /// Dispatch at most `max_steps` events.
    pub fn run_for(&mut self, max_steps: u64, handler: &mut dyn EventHandler) -> u64 {
        let start = self.events_processed;
        for _ in 0..max_steps {
            if self.step(handler).is_none() {
                break;
            }
        }
        self.events_processed - start
    }

    /// Dispatch every event scheduled at or before `horizon`.
    pub fn run_until(&mut self, horizon: VirtualTime, handler: &mut dyn EventHandler) -> u64 {
        let start = self.events_processed;
        while self.scheduler.next_time().map_or(false, |t| t <= horizon) {
            self.step(handler);
        }
        self.events_processed - start
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::packet::PacketId;
    use crate::topology::NodeId;

    fn arrival(p: u64) -> EventType {
        EventType::PacketArrival {
            packet: PacketId::new(p),
        }
    }

    #[test]
    fn test_dispatches_in_time_order() {
        let mut sim = Simulation::new();
        sim.schedule(VirtualTime::new(10.0), arrival(0));
        sim.schedule(VirtualTime::new(5.0), arrival(1));
        sim.schedule(
            VirtualTime::new(7.5),
            EventType::LinkBreak {
                u: NodeId::new(0),
                v: NodeId::new(1),
            },
        );

        let mut times: Vec<f64> = Vec::new();
        let processed = sim.run(&mut |ctx: &mut SimulationContext, _event: &Event| {
            times.push(ctx.now().as_f64());
        });
        assert_eq!(processed, 3);
        assert_eq!(times, vec![5.0, 7.5, 10.0]);
        assert_eq!(sim.current_time(), VirtualTime::new(10.0));
    }

    #[test]
    fn test_handler_chains_processing_delays() {
        let mut sim = Simulation::new();
        sim.schedule(VirtualTime::ZERO, arrival(0));

        let mut times: Vec<f64> = Vec::new();
        sim.run(&mut |ctx: &mut SimulationContext, _event: &Event| {
            times.push(ctx.now().as_f64());
            if ctx.now().as_f64() < 15.0 {
                ctx.schedule_after(5.0, arrival(1));
            }
        });
        assert_eq!(times, vec![0.0, 5.0, 10.0, 15.0]);
    }

    #[test]
    fn test_run_for_and_run_until() {
        let mut sim = Simulation::new();
        for i in 0..100 {
            sim.schedule(VirtualTime::new(i as f64), arrival(i));
        }
        let mut noop = |_ctx: &mut SimulationContext, _event: &Event| {};
        assert_eq!(sim.run_for(10, &mut noop), 10);
        assert_eq!(sim.run_until(VirtualTime::new(49.5), &mut noop), 40);
        assert_eq!(sim.current_time(), VirtualTime::new(49.0));
        assert_eq!(sim.pending_count(), 50);
        assert!(!sim.is_finished());
    }

    #[test]
    #[should_panic(expected = "past")]
    fn test_scheduling_into_the_past_panics() {
        let mut sim = Simulation::new();
        sim.schedule(VirtualTime::new(5.0), arrival(0));
        sim.run(&mut |ctx: &mut SimulationContext, _event: &Event| {
            ctx.schedule_at(VirtualTime::new(1.0), arrival(1));
        });
    }

    #[test]
    fn test_empty_run() {
        let mut sim = Simulation::new();
        let mut noop = |_ctx: &mut SimulationContext, _event: &Event| {};
        assert_eq!(sim.run(&mut noop), 0);
        assert!(sim.is_finished());
    }
}
