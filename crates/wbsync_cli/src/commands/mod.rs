pub(crate) mod meta;
pub(crate) mod metrics_server;
pub(crate) mod sync;
