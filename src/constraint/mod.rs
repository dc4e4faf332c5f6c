//! 过滤条件树
//!
//! ```text
//! ConstraintNode
//!   ├── And([ConstraintNode])   全部为真（空列表为真）
//!   ├── Or([ConstraintNode])    任一为真（空列表为假）
//!   └── Leaf(AtomicConstraint)
//!         ├── SET   : value ∈ values
//!         └── RANGE : start <= value <= stop
//! ```
//!
//! - `validate`: 校验叶子字段组合
//! - `normalize`: 生成与顺序无关的规范形式（用于指纹）
//! - `evaluate`: 对一行维度值求值

pub mod evaluate;
pub mod node;
pub mod normalize;

pub use evaluate::{compare_values, evaluate, DimensionRow};
pub use node::{validate, AtomicConstraint, AtomicConstraintType, ConstraintError, ConstraintNode};
pub use normalize::{normalize, NormalizedConstraint};
