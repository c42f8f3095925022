//! End-to-end scenarios for the handshake, the per-connection engine and both endpoints,
//! all running real pipes within this process.

#[path = "../util/mod.rs"]
#[macro_use]
mod util;
use util::*;

mod disconnect;
mod echo;
mod fifo;
mod multi;
mod pump;
mod reconnect;
mod shutdown;
mod targeted;

#[test]
fn single_client_echo() -> TestResult {
    testinit();
    echo::run(test_pipe_name(make_id!()))
}

#[test]
fn three_concurrent_clients() -> TestResult {
    testinit();
    multi::run(test_pipe_name(make_id!()))
}

#[test]
fn targeted_sends() -> TestResult {
    testinit();
    targeted::run(test_pipe_name(make_id!()))
}

#[test]
fn push_order_is_preserved() -> TestResult {
    testinit();
    fifo::run(test_pipe_name(make_id!()))
}

#[test]
fn client_disconnect_is_observed_and_ids_are_not_reused() -> TestResult {
    testinit();
    disconnect::run(test_pipe_name(make_id!()))
}

#[test]
fn client_reconnects_across_server_restart() -> TestResult {
    testinit();
    reconnect::run(test_pipe_name(make_id!()))
}

#[test]
fn stop_returns_promptly_with_no_client() -> TestResult {
    testinit();
    shutdown::run(test_pipe_name(make_id!()))
}

#[test]
fn callbacks_land_on_the_nominated_thread() -> TestResult {
    testinit();
    pump::run(test_pipe_name(make_id!()))
}
