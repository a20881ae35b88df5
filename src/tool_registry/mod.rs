// Copyright 2025 Userhub Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tool registry and dispatch.
//!
//! A static registry maps a tool name to its discovery schema and its
//! handler. Dispatch is a plain map lookup with no ordering or priority
//! semantics; an unknown name is a bad request naming the tool, and a
//! handler failure is caught here rather than propagating past this
//! layer.

mod handlers;
mod registry;

pub use registry::{ToolContext, ToolDefinition, ToolRegistry};
