//! Specialized vector similarity functions.
//!
//! Vector blobs carry no type tag, so a generic `kvec_dot` cannot know
//! how to decode its arguments. Instead, each (operation, dtypes)
//! combination materializes into its own SQL function with the dtypes
//! baked into the name, e.g. `kvec_dot_f32_f32`. The names are
//! deterministic, so two queries over the same columns translate to
//! byte-identical SQL, and the functions are registered on a connection
//! lazily, the first time a query needs them.

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use crate::error::{QuiverError, Result};
use crate::store::vector::{decode_vector, VectorDtype};

/// Vector similarity operations exposed as query functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorOp {
    /// Inner product of two vectors.
    Dot,
    /// Cosine similarity of two vectors.
    CosSim,
    /// L2 length of one vector.
    L2Norm,
    /// Euclidean distance of two vectors.
    Euclidean,
}

impl VectorOp {
    /// Query-level function name.
    pub fn base_name(&self) -> &'static str {
        match self {
            VectorOp::Dot => "kvec_dot",
            VectorOp::CosSim => "kvec_cos_sim",
            VectorOp::L2Norm => "kvec_l2_norm",
            VectorOp::Euclidean => "kvec_euclidean",
        }
    }

    /// Number of vector arguments the operation takes.
    pub fn arity(&self) -> usize {
        match self {
            VectorOp::L2Norm => 1,
            _ => 2,
        }
    }

    fn compute(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            VectorOp::Dot => dot(a, b),
            VectorOp::CosSim => {
                let na = dot(a, a).sqrt();
                let nb = dot(b, b).sqrt();
                if na == 0.0 || nb == 0.0 {
                    0.0
                } else {
                    dot(a, b) / (na * nb)
                }
            }
            VectorOp::L2Norm => dot(a, a).sqrt(),
            VectorOp::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn dtype_tag(dtype: VectorDtype) -> &'static str {
    match dtype {
        VectorDtype::Float16 => "f16",
        VectorDtype::Float32 => "f32",
        VectorDtype::Float64 => "f64",
    }
}

/// The specialized SQL function name for an operation over the given
/// argument dtypes.
pub fn function_name(op: VectorOp, dtypes: &[VectorDtype]) -> String {
    let mut name = op.base_name().to_string();
    for &dtype in dtypes {
        name.push('_');
        name.push_str(dtype_tag(dtype));
    }
    name
}

/// Registers the specialized function on a connection. Idempotent at
/// the SQLite level: re-registering a name replaces the same closure.
pub fn load_vector_function(
    conn: &Connection,
    op: VectorOp,
    dtypes: &[VectorDtype],
) -> Result<String> {
    if dtypes.len() != op.arity() {
        return Err(QuiverError::Internal(format!(
            "{} takes {} vector arguments, got {} dtypes",
            op.base_name(),
            op.arity(),
            dtypes.len()
        )));
    }
    let name = function_name(op, dtypes);
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    let dtypes: Vec<VectorDtype> = dtypes.to_vec();
    conn.create_scalar_function(&name, op.arity() as i32, flags, move |ctx| {
        let mut vectors = Vec::with_capacity(dtypes.len());
        for (i, &dtype) in dtypes.iter().enumerate() {
            let blob = ctx.get_raw(i).as_blob().map_err(|_| {
                rusqlite::Error::UserFunctionError(
                    format!("vector argument {i} is not a blob").into(),
                )
            })?;
            let vector = decode_vector(blob, dtype).map_err(|e| {
                rusqlite::Error::UserFunctionError(e.to_string().into())
            })?;
            vectors.push(vector);
        }
        let b: &[f64] = vectors.get(1).map(|v| v.as_slice()).unwrap_or(&[]);
        if vectors.len() == 2 && vectors[0].len() != b.len() {
            return Err(rusqlite::Error::UserFunctionError(
                "vector arguments have different lengths".into(),
            ));
        }
        Ok(op.compute(&vectors[0], b))
    })?;
    Ok(name)
}
