// Copyright 2025 Instanced Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Parses templated multi-document manifests into rendered object specs.

use std::collections::HashMap;
use std::sync::Arc;

use kube::api::DynamicObject;
use tera::{Context, Tera};
use tokio::sync::RwLock;

use crate::{Error, Result};

/// Name the manifest text is registered under inside its own `Tera`
/// instance. One `Tera` per challenge keeps a bad template in one challenge
/// from poisoning another's namespace.
const TEMPLATE_NAME: &str = "challenge";

/// A compiled per-challenge manifest template.
#[derive(Clone)]
pub struct ChallengeTemplate {
    tera: Arc<Tera>,
}

impl ChallengeTemplate {
    /// Compiles `text` as a template with a single `ID` variable.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadTemplate` if `text` fails to parse as a Tera
    /// template.
    pub fn compile(text: &str) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, text)
            .map_err(|e| Error::BadTemplate(e.to_string()))?;
        Ok(Self {
            tera: Arc::new(tera),
        })
    }

    /// Renders the template with `{ ID: id }` and parses the result into a
    /// list of dynamic objects, in document order.
    ///
    /// Rendering is a pure function of `(template, id)`: rendering twice with
    /// the same id yields byte-identical output.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadTemplate` if rendering fails, or `Error::BadTemplate`
    /// if any non-empty `---`-delimited document fails to parse as YAML.
    pub fn render(&self, id: &str) -> Result<Vec<DynamicObject>> {
        let mut ctx = Context::new();
        ctx.insert("ID", id);

        let rendered = self
            .tera
            .render(TEMPLATE_NAME, &ctx)
            .map_err(|e| Error::BadTemplate(e.to_string()))?;

        split_documents(&rendered)
            .into_iter()
            .map(|doc| {
                serde_yaml::from_str::<DynamicObject>(doc)
                    .map_err(|e| Error::BadTemplate(format!("could not parse object: {e}")))
            })
            .collect()
    }
}

/// Splits manifest text on lines exactly equal to `---`, discarding
/// empty/whitespace-only fragments, preserving document order.
fn split_documents(text: &str) -> Vec<&str> {
    let mut docs = Vec::new();
    let mut start = 0usize;
    let mut cursor = 0usize;

    for line in text.split_inclusive('\n') {
        let trimmed_line = line.trim_end_matches(['\n', '\r']);
        if trimmed_line == "---" {
            let fragment = &text[start..cursor];
            if !fragment.trim().is_empty() {
                docs.push(fragment);
            }
            start = cursor + line.len();
        }
        cursor += line.len();
    }
    let tail = &text[start..];
    if !tail.trim().is_empty() {
        docs.push(tail);
    }
    docs
}

/// The in-memory challenge name -> compiled-template map. Readers observe an
/// immutable snapshot of whichever `HashMap` was current when they cloned the
/// `Arc`; reload swaps the whole map under one write-lock acquisition.
pub type Catalog = Arc<RwLock<HashMap<String, ChallengeTemplate>>>;
