//! Process-level helpers for applications embedding the publisher and
//! subscriber.

pub mod bootstrap;
