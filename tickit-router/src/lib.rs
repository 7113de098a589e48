// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! The event router: turns a [`Wiring`] declaration into forward/inverse
//! component dependency graphs, and routes one component's `Output` into
//! the `Input`s of its dependants.

mod router;

pub use router::EventRouter;
