//! Process-wide multiplexer pool, keyed by endpoint.
//!
//! The pool only holds weak references. A multiplexer lives as long as a
//! handle or its own transport task keeps it; dead entries are pruned on the
//! next lookup.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError, Weak};

use super::multiplexer::{Endpoint, Multiplexer};
use crate::protocol::generate_id;

static POOL: LazyLock<Mutex<HashMap<Endpoint, Weak<Multiplexer>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Return the live multiplexer for `endpoint`, creating one if needed.
///
/// `socket_id` is only used when a new multiplexer is created; an existing
/// one keeps the identity it was created with.
pub fn acquire(endpoint: &Endpoint, socket_id: Option<&str>) -> Arc<Multiplexer> {
    let mut pool = POOL.lock().unwrap_or_else(PoisonError::into_inner);
    pool.retain(|_, mux| mux.strong_count() > 0);

    if let Some(mux) = pool.get(endpoint).and_then(Weak::upgrade) {
        return mux;
    }

    let socket_id = socket_id.map_or_else(generate_id, str::to_string);
    log::debug!("[Pool] New multiplexer for {} as {}", endpoint, socket_id);
    let mux = Multiplexer::new(endpoint.clone(), socket_id);
    pool.insert(endpoint.clone(), Arc::downgrade(&mux));
    mux
}
