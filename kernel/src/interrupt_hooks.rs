//! Defines the cooperative-bookkeeping hooks `drift_drivers::irq` calls out
//! to on every timer/keyboard interrupt. There is no run queue to poke in a
//! single-threaded design, so these replace what used to be scheduler
//! callbacks with the per-tick work this design actually needs.

use drift_net as net;

#[unsafe(no_mangle)]
extern "C" fn scheduler_timer_tick() {
    net::process_frames();
}

#[unsafe(no_mangle)]
extern "C" fn scheduler_handle_post_irq() {}

#[unsafe(no_mangle)]
extern "C" fn scheduler_request_reschedule_from_interrupt() {}
