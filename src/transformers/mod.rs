//! Built-in transformers.
//!
//! Each module holds one pass: a unit struct implementing [`Transformer`] and
//! the [`Visitor`](crate::traverse::Visitor) or helper passes it runs.

pub mod boolean_literals;
pub mod constant_folding;
pub mod control_flow_flattening;
pub mod control_flow_storage;
pub mod dead_code;
pub mod encoded_literals;
pub mod member_expressions;
pub mod proxy_functions;
pub mod sequence_split;
pub mod string_array;
pub mod unstack;

mod util;

use crate::pipeline::Transformer;

pub use boolean_literals::BooleanLiterals;
pub use constant_folding::ConstantFolding;
pub use control_flow_flattening::ControlFlowFlattening;
pub use control_flow_storage::ControlFlowStorageTransformer;
pub use dead_code::DeadCode;
pub use encoded_literals::EncodedLiterals;
pub use member_expressions::MemberExpressions;
pub use proxy_functions::ProxyFunctions;
pub use sequence_split::SequenceSplit;
pub use string_array::StringArray;
pub use unstack::Unstack;

/// Registry names of the built-ins, in the order the default pipeline runs
/// them.
pub const DEFAULT_ORDER: &[&str] = &[
    "string-array",
    "encoded-literals",
    "control-flow-storage",
    "control-flow-flattening",
    "unstack",
    "proxy-functions",
    "constant-folding",
    "boolean-literals",
    "member-expressions",
    "sequence-split",
    "dead-code",
];

pub fn builtin() -> Vec<Box<dyn Transformer>> {
    vec![
        Box::new(StringArray),
        Box::new(EncodedLiterals),
        Box::new(ControlFlowStorageTransformer),
        Box::new(ControlFlowFlattening),
        Box::new(Unstack),
        Box::new(ProxyFunctions),
        Box::new(ConstantFolding),
        Box::new(BooleanLiterals),
        Box::new(MemberExpressions),
        Box::new(SequenceSplit),
        Box::new(DeadCode),
    ]
}
