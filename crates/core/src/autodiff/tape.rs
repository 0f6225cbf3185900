//! Wengert tape over dense `f64` matrices.
//!
//! Every operation appends a node holding its value and the operation that
//! produced it. [`Tape::grad`] walks the tape backwards and builds the adjoints
//! *as new tape nodes*, so a gradient is itself a differentiable variable.
//! This is what lets the physics residual use `∂u/∂x` and still be
//! differentiated with respect to the network parameters afterwards.
//!
//! A node is *tracked* when it is a [`Tape::variable`] leaf or depends on one.
//! Gradients can only be requested with respect to tracked leaves.

use nalgebra::DMatrix;
use rustc_hash::FxHashMap;

use crate::error::{Result, RiskError};

/// Dense matrix type used for all tape values.
pub type Matrix = DMatrix<f64>;

/// Handle to a node on a [`Tape`].
///
/// Only valid for the tape that created it, and only until that tape is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(usize);

impl Var {
    /// Position of the node on its tape.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Leaf,
    Add(Var, Var),
    Sub(Var, Var),
    /// Element-wise product
    Mul(Var, Var),
    MatMul(Var, Var),
    Transpose(Var),
    /// `scale * x + shift`
    Affine {
        input: Var,
        scale: f64,
    },
    Tanh(Var),
    /// `n x m` plus a `1 x m` row added to every row
    AddRow(Var, Var),
    /// Column sums, `n x m -> 1 x m`
    SumRows(Var),
    /// `1 x m -> rows x m`
    RepeatRows(Var),
    /// Sum of all entries, `-> 1 x 1`
    Sum(Var),
    /// `1 x 1 -> rows x cols`
    Fill(Var),
    /// `n x m -> n x 1`
    Column {
        input: Var,
        index: usize,
    },
    /// `n x 1 -> n x cols` with the input in column `index`, zeros elsewhere
    ScatterColumn {
        input: Var,
        index: usize,
    },
}

impl Op {
    fn parents(self) -> [Option<Var>; 2] {
        match self {
            Op::Leaf => [None, None],
            Op::Add(a, b) | Op::Sub(a, b) | Op::Mul(a, b) | Op::MatMul(a, b) | Op::AddRow(a, b) => {
                [Some(a), Some(b)]
            }
            Op::Transpose(a)
            | Op::Tanh(a)
            | Op::SumRows(a)
            | Op::RepeatRows(a)
            | Op::Sum(a)
            | Op::Fill(a)
            | Op::Affine { input: a, .. }
            | Op::Column { input: a, .. }
            | Op::ScatterColumn { input: a, .. } => [Some(a), None],
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    value: Matrix,
    op: Op,
    tracked: bool,
}

/// Append-only computation graph.
#[derive(Debug, Default)]
pub struct Tape {
    nodes: Vec<Node>,
}

impl Tape {
    /// Create an empty tape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every node, invalidating all outstanding [`Var`]s.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Number of recorded nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Leaf that gradients never flow into.
    pub fn constant(&mut self, value: Matrix) -> Var {
        self.push_leaf(value, false)
    }

    /// Leaf that can be differentiated against.
    pub fn variable(&mut self, value: Matrix) -> Var {
        self.push_leaf(value, true)
    }

    /// Current value of `v`.
    #[must_use]
    pub fn value(&self, v: Var) -> &Matrix {
        &self.nodes[v.0].value
    }

    /// First entry of `v`; intended for `1 x 1` results such as losses.
    #[must_use]
    pub fn scalar(&self, v: Var) -> f64 {
        self.nodes[v.0].value[(0, 0)]
    }

    /// Shape of `v` as (rows, cols).
    #[must_use]
    pub fn shape(&self, v: Var) -> (usize, usize) {
        self.nodes[v.0].value.shape()
    }

    /// Whether `v` is a variable leaf or depends on one.
    #[must_use]
    pub fn is_tracked(&self, v: Var) -> bool {
        self.nodes[v.0].tracked
    }

    fn push_leaf(&mut self, value: Matrix, tracked: bool) -> Var {
        self.nodes.push(Node {
            value,
            op: Op::Leaf,
            tracked,
        });
        Var(self.nodes.len() - 1)
    }

    fn push(&mut self, value: Matrix, op: Op) -> Var {
        let tracked = op.parents().iter().flatten().any(|p| self.nodes[p.0].tracked);
        self.nodes.push(Node { value, op, tracked });
        Var(self.nodes.len() - 1)
    }

    fn same_shape(&self, a: Var, b: Var) -> Result<()> {
        let (sa, sb) = (self.shape(a), self.shape(b));
        if sa == sb {
            Ok(())
        } else {
            Err(RiskError::Shape {
                expected: sa,
                actual: sb,
            })
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Element-wise sum.
    pub fn add(&mut self, a: Var, b: Var) -> Result<Var> {
        self.same_shape(a, b)?;
        let value = self.value(a) + self.value(b);
        Ok(self.push(value, Op::Add(a, b)))
    }

    /// Element-wise difference `a - b`.
    pub fn sub(&mut self, a: Var, b: Var) -> Result<Var> {
        self.same_shape(a, b)?;
        let value = self.value(a) - self.value(b);
        Ok(self.push(value, Op::Sub(a, b)))
    }

    /// Element-wise product.
    pub fn mul(&mut self, a: Var, b: Var) -> Result<Var> {
        self.same_shape(a, b)?;
        let value = self.value(a).component_mul(self.value(b));
        Ok(self.push(value, Op::Mul(a, b)))
    }

    /// Element-wise square.
    pub fn square(&mut self, a: Var) -> Var {
        let value = self.value(a).map(|x| x * x);
        self.push(value, Op::Mul(a, a))
    }

    /// Matrix product `a · b`.
    pub fn matmul(&mut self, a: Var, b: Var) -> Result<Var> {
        let (sa, sb) = (self.shape(a), self.shape(b));
        if sa.1 != sb.0 {
            return Err(RiskError::Shape {
                expected: (sa.1, sb.1),
                actual: sb,
            });
        }
        let value = self.value(a) * self.value(b);
        Ok(self.push(value, Op::MatMul(a, b)))
    }

    /// Transpose.
    pub fn transpose(&mut self, a: Var) -> Var {
        let value = self.value(a).transpose();
        self.push(value, Op::Transpose(a))
    }

    /// `scale * a + shift`, element-wise.
    pub fn affine(&mut self, a: Var, scale: f64, shift: f64) -> Var {
        let value = self.value(a).map(|x| scale * x + shift);
        self.push(value, Op::Affine { input: a, scale })
    }

    /// Hyperbolic tangent, element-wise.
    pub fn tanh(&mut self, a: Var) -> Var {
        let value = self.value(a).map(f64::tanh);
        self.push(value, Op::Tanh(a))
    }

    /// Add the `1 x m` row `row` to every row of the `n x m` matrix `a`.
    pub fn add_row(&mut self, a: Var, row: Var) -> Result<Var> {
        let (sa, sr) = (self.shape(a), self.shape(row));
        if sr != (1, sa.1) {
            return Err(RiskError::Shape {
                expected: (1, sa.1),
                actual: sr,
            });
        }
        let (va, vr) = (self.value(a), self.value(row));
        let value = Matrix::from_fn(sa.0, sa.1, |r, c| va[(r, c)] + vr[(0, c)]);
        Ok(self.push(value, Op::AddRow(a, row)))
    }

    /// Column sums as a `1 x m` row.
    pub fn sum_rows(&mut self, a: Var) -> Var {
        let va = self.value(a);
        let value = Matrix::from_fn(1, va.ncols(), |_, c| va.column(c).sum());
        self.push(value, Op::SumRows(a))
    }

    /// Stack the `1 x m` row `a` into `rows` identical rows.
    pub fn repeat_rows(&mut self, a: Var, rows: usize) -> Result<Var> {
        let sa = self.shape(a);
        if sa.0 != 1 {
            return Err(RiskError::Shape {
                expected: (1, sa.1),
                actual: sa,
            });
        }
        let va = self.value(a);
        let value = Matrix::from_fn(rows, sa.1, |_, c| va[(0, c)]);
        Ok(self.push(value, Op::RepeatRows(a)))
    }

    /// Sum of every entry as a `1 x 1` matrix.
    pub fn sum(&mut self, a: Var) -> Var {
        let value = Matrix::from_element(1, 1, self.value(a).sum());
        self.push(value, Op::Sum(a))
    }

    /// Mean of every entry as a `1 x 1` matrix.
    pub fn mean(&mut self, a: Var) -> Var {
        let n = self.value(a).len() as f64;
        let total = self.sum(a);
        self.affine(total, 1.0 / n, 0.0)
    }

    /// Broadcast the `1 x 1` matrix `a` to `rows x cols`.
    pub fn fill(&mut self, a: Var, rows: usize, cols: usize) -> Result<Var> {
        let sa = self.shape(a);
        if sa != (1, 1) {
            return Err(RiskError::Shape {
                expected: (1, 1),
                actual: sa,
            });
        }
        let value = Matrix::from_element(rows, cols, self.scalar(a));
        Ok(self.push(value, Op::Fill(a)))
    }

    /// Column `index` of `a` as an `n x 1` matrix.
    pub fn column(&mut self, a: Var, index: usize) -> Result<Var> {
        let sa = self.shape(a);
        if index >= sa.1 {
            return Err(RiskError::Shape {
                expected: (sa.0, index + 1),
                actual: sa,
            });
        }
        let va = self.value(a);
        let value = Matrix::from_fn(sa.0, 1, |r, _| va[(r, index)]);
        Ok(self.push(value, Op::Column { input: a, index }))
    }

    /// Place the `n x 1` matrix `a` into column `index` of an `n x cols` zero matrix.
    pub fn scatter_column(&mut self, a: Var, index: usize, cols: usize) -> Result<Var> {
        let sa = self.shape(a);
        if sa.1 != 1 || index >= cols {
            return Err(RiskError::Shape {
                expected: (sa.0, 1),
                actual: sa,
            });
        }
        let va = self.value(a);
        let value = Matrix::from_fn(sa.0, cols, |r, c| if c == index { va[(r, 0)] } else { 0.0 });
        Ok(self.push(value, Op::ScatterColumn { input: a, index }))
    }

    // ------------------------------------------------------------------
    // Reverse pass
    // ------------------------------------------------------------------

    /// Gradients of `output` with respect to each of `wrt`, seeded with ones.
    ///
    /// For a `1 x 1` output this is the ordinary gradient. For an `n x 1`
    /// output whose rows are independent samples, row `i` of each result is
    /// the derivative of `output[i]` alone.
    pub fn grad(&mut self, output: Var, wrt: &[Var]) -> Result<Vec<Var>> {
        let (rows, cols) = self.shape(output);
        self.grad_with_seed(output, Matrix::from_element(rows, cols, 1.0), wrt)
    }

    /// Vector-Jacobian product of `output` with `seed`, for each of `wrt`.
    ///
    /// The returned variables are recorded on the tape and stay differentiable.
    pub fn grad_with_seed(&mut self, output: Var, seed: Matrix, wrt: &[Var]) -> Result<Vec<Var>> {
        if seed.shape() != self.shape(output) {
            return Err(RiskError::Shape {
                expected: self.shape(output),
                actual: seed.shape(),
            });
        }
        for &w in wrt {
            if !self.is_tracked(w) {
                return Err(RiskError::Differentiation(format!(
                    "node {} is not tracked; create it with Tape::variable before the forward pass",
                    w.0
                )));
            }
        }

        // Nodes on a path from some `wrt` leaf to the output
        let mut needed = vec![false; output.0 + 1];
        for &w in wrt {
            if w.0 <= output.0 {
                needed[w.0] = true;
            }
        }
        for idx in 0..=output.0 {
            if needed[idx] {
                continue;
            }
            let node = &self.nodes[idx];
            needed[idx] =
                node.tracked && node.op.parents().iter().flatten().any(|p| needed[p.0]);
        }
        if !needed[output.0] {
            return Err(RiskError::Differentiation(format!(
                "output node {} does not depend on the requested variables",
                output.0
            )));
        }

        let seed = self.constant(seed);
        let mut grads: FxHashMap<usize, Var> = FxHashMap::default();
        grads.insert(output.0, seed);

        for idx in (0..=output.0).rev() {
            if !needed[idx] {
                continue;
            }
            let Some(&g) = grads.get(&idx) else {
                continue;
            };
            let op = self.nodes[idx].op;
            let wants = |v: Var| needed[v.0];

            match op {
                Op::Leaf => {}
                Op::Add(a, b) => {
                    if wants(a) {
                        self.accumulate(&mut grads, a, g)?;
                    }
                    if wants(b) {
                        self.accumulate(&mut grads, b, g)?;
                    }
                }
                Op::Sub(a, b) => {
                    if wants(a) {
                        self.accumulate(&mut grads, a, g)?;
                    }
                    if wants(b) {
                        let neg = self.affine(g, -1.0, 0.0);
                        self.accumulate(&mut grads, b, neg)?;
                    }
                }
                Op::Mul(a, b) => {
                    if wants(a) {
                        let ga = self.mul(g, b)?;
                        self.accumulate(&mut grads, a, ga)?;
                    }
                    if wants(b) {
                        let gb = self.mul(g, a)?;
                        self.accumulate(&mut grads, b, gb)?;
                    }
                }
                Op::MatMul(a, b) => {
                    if wants(a) {
                        let bt = self.transpose(b);
                        let ga = self.matmul(g, bt)?;
                        self.accumulate(&mut grads, a, ga)?;
                    }
                    if wants(b) {
                        let at = self.transpose(a);
                        let gb = self.matmul(at, g)?;
                        self.accumulate(&mut grads, b, gb)?;
                    }
                }
                Op::Transpose(a) => {
                    let ga = self.transpose(g);
                    self.accumulate(&mut grads, a, ga)?;
                }
                Op::Affine { input, scale } => {
                    let ga = self.affine(g, scale, 0.0);
                    self.accumulate(&mut grads, input, ga)?;
                }
                Op::Tanh(a) => {
                    // d tanh(a) = 1 - tanh(a)^2, built from this node's own output
                    let y = Var(idx);
                    let y2 = self.square(y);
                    let slope = self.affine(y2, -1.0, 1.0);
                    let ga = self.mul(g, slope)?;
                    self.accumulate(&mut grads, a, ga)?;
                }
                Op::AddRow(a, row) => {
                    if wants(a) {
                        self.accumulate(&mut grads, a, g)?;
                    }
                    if wants(row) {
                        let gr = self.sum_rows(g);
                        self.accumulate(&mut grads, row, gr)?;
                    }
                }
                Op::SumRows(a) => {
                    let rows = self.shape(a).0;
                    let ga = self.repeat_rows(g, rows)?;
                    self.accumulate(&mut grads, a, ga)?;
                }
                Op::RepeatRows(a) => {
                    let ga = self.sum_rows(g);
                    self.accumulate(&mut grads, a, ga)?;
                }
                Op::Sum(a) => {
                    let (rows, cols) = self.shape(a);
                    let ga = self.fill(g, rows, cols)?;
                    self.accumulate(&mut grads, a, ga)?;
                }
                Op::Fill(a) => {
                    let ga = self.sum(g);
                    self.accumulate(&mut grads, a, ga)?;
                }
                Op::Column { input, index } => {
                    let cols = self.shape(input).1;
                    let ga = self.scatter_column(g, index, cols)?;
                    self.accumulate(&mut grads, input, ga)?;
                }
                Op::ScatterColumn { input, index } => {
                    let ga = self.column(g, index)?;
                    self.accumulate(&mut grads, input, ga)?;
                }
            }
        }

        wrt.iter()
            .map(|w| {
                grads.get(&w.0).copied().ok_or_else(|| {
                    RiskError::Differentiation(format!(
                        "output node {} does not depend on node {}",
                        output.0, w.0
                    ))
                })
            })
            .collect()
    }

    fn accumulate(
        &mut self,
        grads: &mut FxHashMap<usize, Var>,
        target: Var,
        contribution: Var,
    ) -> Result<()> {
        let summed = match grads.get(&target.0) {
            Some(&existing) => self.add(existing, contribution)?,
            None => contribution,
        };
        grads.insert(target.0, summed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn m(rows: usize, cols: usize, data: &[f64]) -> Matrix {
        Matrix::from_row_slice(rows, cols, data)
    }

    #[test]
    fn product_rule() {
        let mut tape = Tape::new();
        let x = tape.variable(m(1, 1, &[3.0]));
        let y = tape.variable(m(1, 1, &[4.0]));
        let xy = tape.mul(x, y).unwrap();
        let out = tape.add(xy, x).unwrap();

        let g = tape.grad(out, &[x, y]).unwrap();
        assert_eq!(tape.scalar(g[0]), 5.0);
        assert_eq!(tape.scalar(g[1]), 3.0);
    }

    #[test]
    fn matmul_gradients() {
        let mut tape = Tape::new();
        let a = tape.variable(m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        let b = tape.variable(m(3, 1, &[0.5, -1.0, 2.0]));
        let ab = tape.matmul(a, b).unwrap();
        let loss = tape.sum(ab);

        let g = tape.grad(loss, &[a, b]).unwrap();
        // d/dA sum(A·b) = 1·bᵀ for every row
        assert_eq!(tape.value(g[0]), &m(2, 3, &[0.5, -1.0, 2.0, 0.5, -1.0, 2.0]));
        // d/db sum(A·b) = column sums of A
        assert_eq!(tape.value(g[1]), &m(3, 1, &[5.0, 7.0, 9.0]));
    }

    #[test]
    fn row_broadcast_gradient_sums_over_rows() {
        let mut tape = Tape::new();
        let a = tape.constant(m(3, 2, &[0.0; 6]));
        let bias = tape.variable(m(1, 2, &[1.0, 2.0]));
        let shifted = tape.add_row(a, bias).unwrap();
        let sq = tape.square(shifted);
        let loss = tape.sum(sq);

        let g = tape.grad(loss, &[bias]).unwrap();
        // d/db Σ (b_c)^2 over 3 rows = 3 · 2 b_c
        assert_eq!(tape.value(g[0]), &m(1, 2, &[6.0, 12.0]));
    }

    #[test]
    fn tanh_second_derivative() {
        let mut tape = Tape::new();
        let x0 = 0.3_f64;
        let x = tape.variable(m(1, 1, &[x0]));
        let y = tape.tanh(x);

        let dy = tape.grad(y, &[x]).unwrap()[0];
        let t = x0.tanh();
        assert_relative_eq!(tape.scalar(dy), 1.0 - t * t, epsilon = 1e-12);

        // The first derivative is itself differentiable
        let d2y = tape.grad(dy, &[x]).unwrap()[0];
        assert_relative_eq!(tape.scalar(d2y), -2.0 * t * (1.0 - t * t), epsilon = 1e-12);
    }

    #[test]
    fn column_and_scatter_are_adjoint() {
        let mut tape = Tape::new();
        let a = tape.variable(m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        let c = tape.column(a, 1).unwrap();
        assert_eq!(tape.value(c), &m(2, 1, &[2.0, 5.0]));
        let loss = tape.sum(c);

        let g = tape.grad(loss, &[a]).unwrap()[0];
        assert_eq!(tape.value(g), &m(2, 3, &[0.0, 1.0, 0.0, 0.0, 1.0, 0.0]));
    }

    #[test]
    fn per_row_seed_gives_per_sample_derivatives() {
        let mut tape = Tape::new();
        let x = tape.variable(m(3, 1, &[1.0, 2.0, 3.0]));
        let y = tape.square(x);
        let g = tape.grad(y, &[x]).unwrap()[0];
        assert_eq!(tape.value(g), &m(3, 1, &[2.0, 4.0, 6.0]));
    }

    #[test]
    fn untracked_leaf_is_rejected() {
        let mut tape = Tape::new();
        let x = tape.constant(m(1, 1, &[1.0]));
        let w = tape.variable(m(1, 1, &[2.0]));
        let y = tape.mul(x, w).unwrap();

        let err = tape.grad(y, &[x]).unwrap_err();
        assert!(matches!(err, RiskError::Differentiation(_)));
    }

    #[test]
    fn unrelated_variable_is_rejected() {
        let mut tape = Tape::new();
        let x = tape.variable(m(1, 1, &[1.0]));
        let unused = tape.variable(m(1, 1, &[2.0]));
        let y = tape.square(x);

        let err = tape.grad(y, &[unused]).unwrap_err();
        assert!(matches!(err, RiskError::Differentiation(_)));
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let mut tape = Tape::new();
        let a = tape.constant(m(2, 3, &[0.0; 6]));
        let b = tape.constant(m(2, 3, &[0.0; 6]));
        assert!(matches!(
            tape.matmul(a, b),
            Err(RiskError::Shape { .. })
        ));
        let c = tape.constant(m(3, 2, &[0.0; 6]));
        assert!(matches!(tape.add(a, c), Err(RiskError::Shape { .. })));
    }

    #[test]
    fn clear_resets_the_tape() {
        let mut tape = Tape::new();
        let x = tape.variable(m(1, 1, &[1.0]));
        let _ = tape.square(x);
        assert_eq!(tape.len(), 2);
        tape.clear();
        assert!(tape.is_empty());
    }
}
