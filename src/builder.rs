//! Assembles a [`Program`] from a stream of parser events.
//!
//! The six methods below are invoked in source order by [`crate::front::parse`].
//! Nothing here knows about text, tokens or line numbers — that is the
//! front-end's job; the builder only knows the shape a program must have.

use crate::common::Id;
use crate::error::Error;
use crate::ir::instr::Instruction;
use crate::ir::program::{fresh_entry_block, fresh_named_block, Block, Function};
use crate::ir::value::Register;
use crate::ir::Program;

#[derive(Debug, Default)]
pub struct Builder {
    in_data_section: bool,
    program: Program,
    curr_func: Option<Function>,
    curr_block: Option<Block>,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    pub fn start_data(&mut self) {
        self.in_data_section = true;
    }

    pub fn start_text(&mut self) {
        self.in_data_section = false;
    }

    /// Closes the current block and function (if any), then opens a new
    /// function with a fresh `__start__` block.
    pub fn push_frame(&mut self, name: Id, size: u32, params: Vec<Register>) -> Result<(), Error> {
        self.close_function()?;
        let mut func = Function::new(name, size, params);
        let block = fresh_entry_block(&mut func);
        self.curr_func = Some(func);
        self.curr_block = Some(block);
        Ok(())
    }

    /// Closes the current block (pointing its fall-through at the new label)
    /// and opens a new block with that name.
    pub fn push_label(&mut self, name: Id) -> Result<(), Error> {
        let func = self.curr_func.as_mut().ok_or_else(|| Error::Shape {
            message: format!("label {name} with no active function"),
        })?;
        let mut block = self.curr_block.take().expect("invariant: a function always has a current block");
        block.fallthrough = Some(name);
        insert_block(func, block)?;
        self.curr_block = Some(fresh_named_block(func, name));
        Ok(())
    }

    /// Appends to the current block, or inserts into `program.globals` when
    /// in the data section.
    pub fn push_instr(&mut self, instr: Instruction) -> Result<(), Error> {
        if self.in_data_section {
            match instr {
                Instruction::Global { name, value } => {
                    self.program.globals.insert(name, value);
                    Ok(())
                }
                other => Err(Error::Shape {
                    message: format!("non-global instruction `{other}` in data section"),
                }),
            }
        } else {
            let block = self.curr_block.as_mut().ok_or_else(|| Error::Shape {
                message: format!("instruction `{instr}` with no active block"),
            })?;
            block.instrs.push(instr);
            Ok(())
        }
    }

    /// Closes the trailing block and function.
    pub fn finalize(mut self) -> Result<Program, Error> {
        self.close_function()?;
        Ok(self.program)
    }

    fn close_function(&mut self) -> Result<(), Error> {
        let Some(mut func) = self.curr_func.take() else {
            return Ok(());
        };
        if let Some(block) = self.curr_block.take() {
            insert_block(&mut func, block)?;
        }
        if self.program.functions.contains_key(&func.name) {
            return Err(Error::Shape {
                message: format!("duplicate function `{}`", func.name),
            });
        }
        self.program.functions.insert(func.name, func);
        Ok(())
    }
}

fn insert_block(func: &mut Function, block: Block) -> Result<(), Error> {
    if func.blocks.contains_key(&block.name) {
        return Err(Error::Shape {
            message: format!("duplicate block `{}` in function `{}`", block.name, func.name),
        });
    }
    func.blocks.insert(block.name, block);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;
    use crate::ir::value::Value;

    #[test]
    fn simple_program_builds() {
        let mut b = Builder::new();
        b.push_frame(id("main"), 0, vec![]).unwrap();
        b.push_instr(Instruction::LoadImm {
            value: Value::Int(7),
            dst: 0,
        })
        .unwrap();
        b.push_instr(Instruction::IWrite { src: 0 }).unwrap();
        b.push_instr(Instruction::Ret).unwrap();
        let program = b.finalize().unwrap();
        let main = program.functions.get(&id("main")).unwrap();
        let entry = main.blocks.get(&id("__start__")).unwrap();
        assert_eq!(entry.instrs.len(), 3);
        assert_eq!(entry.fallthrough, None);
    }

    #[test]
    fn labels_chain_fallthrough() {
        let mut b = Builder::new();
        b.push_frame(id("main"), 0, vec![]).unwrap();
        b.push_instr(Instruction::Ret).unwrap();
        b.push_label(id("L")).unwrap();
        b.push_instr(Instruction::Ret).unwrap();
        let program = b.finalize().unwrap();
        let main = program.functions.get(&id("main")).unwrap();
        let entry = main.blocks.get(&id("__start__")).unwrap();
        assert_eq!(entry.fallthrough, Some(id("L")));
        assert!(main.blocks.get(&id("L")).unwrap().fallthrough.is_none());
    }

    #[test]
    fn duplicate_function_is_shape_error() {
        let mut b = Builder::new();
        b.push_frame(id("main"), 0, vec![]).unwrap();
        b.push_frame(id("main"), 0, vec![]).unwrap();
        assert!(matches!(b.finalize(), Err(Error::Shape { .. })));
    }

    #[test]
    fn label_without_function_is_shape_error() {
        let mut b = Builder::new();
        assert!(matches!(b.push_label(id("L")), Err(Error::Shape { .. })));
    }

    #[test]
    fn instr_without_block_outside_data_is_shape_error() {
        let mut b = Builder::new();
        assert!(matches!(
            b.push_instr(Instruction::Ret),
            Err(Error::Shape { .. })
        ));
    }

    #[test]
    fn globals_go_to_program_globals() {
        let mut b = Builder::new();
        b.start_data();
        b.push_instr(Instruction::Global {
            name: id("g"),
            value: Value::Int(5),
        })
        .unwrap();
        b.start_text();
        b.push_frame(id("main"), 0, vec![]).unwrap();
        b.push_instr(Instruction::Ret).unwrap();
        let program = b.finalize().unwrap();
        assert_eq!(program.globals.get(&id("g")), Some(&Value::Int(5)));
    }
}
