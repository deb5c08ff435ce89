//! Test doubles shared by the unit tests of this crate.


pub(crate) use self::{
    connector::ScriptedConnector,
    sink::{BrokenSink, SharedSink},
};
