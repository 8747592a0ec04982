pub(crate) mod alert;
pub(crate) mod meta;
pub(crate) mod migrate;
pub(crate) mod run;
pub(crate) mod scan;
pub(crate) mod shared;
pub(crate) mod task;
pub(crate) mod webhook;
