// Copyright 2025 OpsAgent Project
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

// Natural-language query agent over operational data. A question is
// embedded, matched against described tables, compiled to a read-only SQL
// query by a language model, screened by the guard, executed under a
// row-level-security session context, and summarized as a conversational
// answer.

pub mod agent;
pub mod answer;
pub mod db;
pub mod guard;
pub mod llm;
pub mod rls;
pub mod similarity;
pub mod sqlgen;

pub use agent::{Agent, QueryTrace};
pub use guard::Verdict;
pub use llm::LlmClient;
pub use similarity::{TableIndex, TableMatch};
