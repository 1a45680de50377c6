//! Robot log: call-site attributed lines, urgent vs. buffered dispatch, and the
//! transports and diagnostic hooks around it.

pub mod diagnostics;
pub mod dispatcher;
pub mod record;
pub mod transport;
