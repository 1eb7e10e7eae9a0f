//! Assertion macros shared by integration tests.

/// Await a requester exchange, returning the reply.
///
/// On failure the panic names the call site and says whether the error was
/// a timeout and whether it cost the connection.
#[macro_export]
macro_rules! reply_expect {
    ($exchange:expr) => {{
        match $exchange.await {
            Ok(reply) => reply,
            Err(error) => panic!(
                "exchange failed at {}:{}: {error} (timeout: {}, force-closed: {})",
                file!(),
                line!(),
                error.is_timeout(),
                error.requires_force_close(),
            ),
        }
    }};
}

/// Lease a connection from `pool`, panicking with the pool's bookkeeping if
/// the lease fails.
#[macro_export]
macro_rules! acquire_expect {
    ($pool:expr) => {{
        let pool = &$pool;
        match pool.acquire().await {
            Ok(conn) => conn,
            Err(error) => panic!(
                "acquire failed at {}:{}: {error}; pool {:?}",
                file!(),
                line!(),
                pool.stats(),
            ),
        }
    }};
}

pub use crate::{acquire_expect, reply_expect};
