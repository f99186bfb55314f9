//! Engine behavior tests, driven through the public manager API with the
//! scripted in-process transport from `test_helpers`.

pub(crate) use super::test_helpers::*;
