//! Compact stack bytecode for offset expressions.
//!
//! Literal expressions are folded once at parse time. An expression that starts from another
//! client's value keeps its program and is re-run for every request. Evaluation runs in `i128`
//! so unsigned 64-bit literals and signed offsets share one domain.
use smallvec::SmallVec;

use super::links::LinkError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpCode {
    PushConst(i128),
    /// Push the current value of the linked offset source.
    ReadLink,
    Add,
    Sub,
    Mul,
    Neg,
}

pub trait EvalContext {
    fn read_link(&mut self) -> Result<i64, LinkError>;
}

/// Context for programs that never read a link.
pub(crate) struct Constant;

impl EvalContext for Constant {
    fn read_link(&mut self) -> Result<i64, LinkError> {
        Err(LinkError::Unknown(String::new()))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExprProgram {
    ops: SmallVec<[OpCode; 8]>,
}

impl ExprProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: OpCode) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[OpCode] {
        &self.ops
    }

    pub fn reads_link(&self) -> bool {
        self.ops.contains(&OpCode::ReadLink)
    }

    /// Run the program left to right. Arithmetic wraps; a malformed program yields 0.
    pub fn evaluate<C: EvalContext>(&self, ctx: &mut C) -> Result<i128, LinkError> {
        let mut stack: SmallVec<[i128; 8]> = SmallVec::new();
        for op in &self.ops {
            match *op {
                OpCode::PushConst(value) => stack.push(value),
                OpCode::ReadLink => stack.push(ctx.read_link()?.into()),
                OpCode::Add => apply_binary(&mut stack, i128::wrapping_add),
                OpCode::Sub => apply_binary(&mut stack, i128::wrapping_sub),
                OpCode::Mul => apply_binary(&mut stack, i128::wrapping_mul),
                OpCode::Neg => {
                    if let Some(val) = stack.pop() {
                        stack.push(val.wrapping_neg());
                    }
                }
            }
        }
        Ok(stack.pop().unwrap_or(0))
    }
}

fn apply_binary(stack: &mut SmallVec<[i128; 8]>, func: fn(i128, i128) -> i128) {
    if let (Some(rhs), Some(lhs)) = (stack.pop(), stack.pop()) {
        stack.push(func(lhs, rhs));
    }
}

#[cfg(test)]
mod tests {
    //! Exercises the expression VM to guarantee deterministic evaluation semantics.
    use super::*;

    struct Fixed(i64);

    impl EvalContext for Fixed {
        fn read_link(&mut self) -> Result<i64, LinkError> {
            Ok(self.0)
        }
    }

    #[test]
    fn program_executes_stack_ops() {
        let mut program = ExprProgram::new();
        program.push(OpCode::PushConst(4));
        program.push(OpCode::PushConst(1));
        program.push(OpCode::Add);
        program.push(OpCode::PushConst(2));
        program.push(OpCode::Mul);
        let value = program.evaluate(&mut Constant).expect("constant program");
        assert_eq!(value, 10, "(4 + 1) * 2 should equal ten");
        assert!(!program.reads_link());
    }

    #[test]
    fn linked_program_reads_context_each_time() {
        let mut program = ExprProgram::new();
        program.push(OpCode::ReadLink);
        program.push(OpCode::PushConst(4));
        program.push(OpCode::Mul);
        program.push(OpCode::PushConst(2));
        program.push(OpCode::Sub);
        assert_eq!(program.evaluate(&mut Fixed(3)), Ok(10));
        assert_eq!(program.evaluate(&mut Fixed(0)), Ok(-2), "negative results are kept");
        assert!(program.reads_link());
    }

    #[test]
    fn unsigned_64_bit_constants_keep_their_value() {
        let mut program = ExprProgram::new();
        program.push(OpCode::PushConst(u64::MAX.into()));
        program.push(OpCode::PushConst(1));
        program.push(OpCode::Add);
        let value = program.evaluate(&mut Constant).expect("constant program");
        assert_eq!(value, i128::from(u64::MAX) + 1, "no wrap at 64 bits");
    }

    #[test]
    fn link_failures_propagate() {
        let mut program = ExprProgram::new();
        program.push(OpCode::ReadLink);
        assert!(program.evaluate(&mut Constant).is_err());
    }
}
