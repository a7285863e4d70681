//! 🚿 Pipes: named stages between a source tap and a sink tap.
//!
//! A bare `Pipe::new("copy")` is the identity stage, tuples in and tuples out.
//! `Pipe::each(pipe, op)` appends a per-tuple operation:
//!
//! - `Identity(fields)`: same values, new names, by position. The rename-everything move.
//! - `Rename { from, to }`: one field gets a new name. The witness-protection move.
//! - `Retain(fields)`: keep only these, in this order. The Marie Kondo move.
//!
//! 🧠 Knowledge graph: operations change `Fields` once per schema and tuples once per row.
//! The source worker applies the pipe to every batch before it hits the channel, so
//! sink workers only ever see post-pipe tuples.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::common::{Fields, Tuple, TupleBatch};

/// 🔧 A single per-tuple operation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub enum PipeOp {
    /// 🪞 Positional rename of every field. Width must match.
    Identity(Fields),
    /// 🏷️ Rename one field.
    Rename { from: String, to: String },
    /// ✂️ Project down to these fields.
    Retain(Fields),
}

/// 🚿 A named chain of operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipe {
    name: String,
    ops: Vec<PipeOp>,
}

impl Pipe {
    /// 🚀 An identity pipe with a name. Names matter: `FlowDef` joins source and sink by it.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
        }
    }

    /// ➕ Append an operation, keeping the name of the upstream pipe.
    pub fn each(mut pipe: Pipe, op: PipeOp) -> Self {
        pipe.ops.push(op);
        pipe
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ops(&self) -> &[PipeOp] {
        &self.ops
    }

    /// 📐 Compile the chain against an incoming schema.
    ///
    /// Validates every op (widths, missing fields, clashes) and returns the output
    /// schema plus a per-tuple plan. Done once per distinct input schema.
    pub fn plan(&self, incoming: &Fields) -> Result<PipePlan> {
        let mut fields = incoming.clone();
        let mut projections: Vec<Vec<usize>> = Vec::new();

        for (step, op) in self.ops.iter().enumerate() {
            fields = match op {
                PipeOp::Identity(declared) => {
                    if declared.len() != fields.len() {
                        bail!(
                            "💀 Pipe '{}' step {}: Identity declares {} fields {} but the incoming tuple has {} fields {}. Positional renames need a name for every position.",
                            self.name,
                            step,
                            declared.len(),
                            declared,
                            fields.len(),
                            fields
                        );
                    }
                    declared.clone()
                }
                PipeOp::Rename { from, to } => {
                    let position = fields.position(from).with_context(|| {
                        format!(
                            "💀 Pipe '{}' step {}: cannot rename '{}', the tuple only has {}",
                            self.name, step, from, fields
                        )
                    })?;
                    let mut names = fields.names().to_vec();
                    names[position] = to.clone();
                    Fields::new(names).with_context(|| {
                        format!("💀 Pipe '{}' step {}: renaming '{}' to '{}' collides", self.name, step, from, to)
                    })?
                }
                PipeOp::Retain(kept) => {
                    let positions = fields.select(kept).with_context(|| {
                        format!("💀 Pipe '{}' step {}: Retain asked for fields that aren't there", self.name, step)
                    })?;
                    projections.push(positions);
                    kept.clone()
                }
            };
        }

        Ok(PipePlan {
            output: Arc::new(fields),
            projections,
        })
    }
}

/// 📋 A compiled pipe: the output schema plus the projections to apply per tuple.
#[derive(Debug, Clone)]
pub struct PipePlan {
    output: Arc<Fields>,
    projections: Vec<Vec<usize>>,
}

impl PipePlan {
    pub fn output(&self) -> &Arc<Fields> {
        &self.output
    }

    /// 🔄 Run a batch through the plan. Renames are free, projections copy.
    pub fn apply(&self, batch: TupleBatch) -> TupleBatch {
        let tuples = if self.projections.is_empty() {
            batch.tuples
        } else {
            batch
                .tuples
                .into_iter()
                .map(|tuple| {
                    self.projections
                        .iter()
                        .fold(tuple, |tuple: Tuple, positions| tuple.project(positions))
                })
                .collect()
        };
        TupleBatch {
            fields: self.output.clone(),
            tuples,
        }
    }
}
