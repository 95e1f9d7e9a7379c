//! Front-end contract: what the core consumes from the lifter and the
//! analysis host.
//!
//! The analysis host supplies per-function metadata and per-block
//! disassembly as JSON; the serde types here are the schema of that
//! exchange. The architecture-specific lifter (out of scope for the core)
//! turns each block's instruction list into a [`Container`] of IR
//! statements; [`build_function`] then assembles the complete [`Function`]
//! the pipeline operates on.
//!
//! [`ArchProfile`] carries the little architecture knowledge the core itself
//! needs: which registers hold the stack pointer and the flags (propagated
//! between SSA waves so dereference addresses canonicalize), and which
//! calling conventions the lifter may reference at call sites.

use serde::{Deserialize, Serialize};

use crate::{
    ir::{BasicBlock, Container, Function, Location, Variable},
    Error, Result,
};

/// How an argument descriptor binds to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    /// A true call argument.
    Arg,
    /// A register-resident value the host chose to name.
    Reg,
    /// A stack-frame local.
    Var,
}

/// Physical reference of an argument or local: a register name, or a
/// base+offset pair on the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationRef {
    /// Named register.
    Register(String),
    /// `base + offset` on the stack frame.
    Frame {
        /// Frame base register.
        base: String,
        /// Byte offset from the base.
        offset: i64,
    },
}

/// One declared argument or local variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgDescriptor {
    /// Source-level name.
    pub name: String,
    /// Binding kind.
    pub kind: ArgKind,
    /// Physical storage reference.
    #[serde(rename = "ref")]
    pub location: LocationRef,
    /// Type hint as reported by the host.
    #[serde(rename = "type")]
    pub type_hint: String,
}

/// One disassembled instruction of a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsnDescriptor {
    /// Instruction address.
    pub addr: u64,
    /// Disassembly text, consumed by the arch lifter.
    pub text: String,
}

/// One basic block as reported by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// Block address.
    pub addr: u64,
    /// Taken / unconditional successor.
    #[serde(default)]
    pub jump: Option<u64>,
    /// Fall-through successor.
    #[serde(default)]
    pub fail: Option<u64>,
    /// Switch targets, if the block ends in an indirect dispatch.
    #[serde(default)]
    pub switch_op: Vec<u64>,
    /// Entry flag.
    #[serde(default)]
    pub entry: bool,
    /// Exit flag.
    #[serde(default)]
    pub exit: bool,
    /// The block's instructions.
    #[serde(default)]
    pub instructions: Vec<InsnDescriptor>,
}

/// Per-function metadata from the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Entry address.
    pub addr: u64,
    /// Function name.
    pub name: String,
    /// Lower address bound of the lifted region.
    pub lower: u64,
    /// Upper address bound of the lifted region.
    pub upper: u64,
    /// Return-type hint.
    #[serde(default)]
    pub rettype: String,
    /// Declared arguments and locals.
    #[serde(default)]
    pub args: Vec<ArgDescriptor>,
    /// Basic blocks.
    pub blocks: Vec<BlockDescriptor>,
}

/// Assembles a [`Function`] from a host descriptor and the lifted block
/// bodies (one [`Container`] per descriptor block, in the same order).
///
/// # Errors
///
/// Returns [`Error::MalformedIr`] when the body count does not match the
/// block count.
pub fn build_function(desc: &FunctionDescriptor, bodies: Vec<Container>) -> Result<Function> {
    if desc.blocks.len() != bodies.len() {
        return Err(malformed_ir!(
            "{}: {} blocks but {} lifted bodies",
            desc.name,
            desc.blocks.len(),
            bodies.len()
        ));
    }

    let mut func = Function::new(desc.addr, &desc.name);
    func.set_return_type(&desc.rettype);

    for arg in &desc.args {
        let location = match &arg.location {
            LocationRef::Register(name) => Location::Register(name.clone()),
            LocationRef::Frame { base, offset } => Location::Stack {
                base: base.clone(),
                offset: *offset,
            },
        };
        let variable = Variable {
            name: arg.name.clone(),
            size: 0,
            location: Some(location),
        };
        match arg.kind {
            ArgKind::Arg | ArgKind::Reg => func.add_arg(variable),
            ArgKind::Var => func.add_local(variable),
        }
    }

    for (block_desc, body) in desc.blocks.iter().zip(bodies) {
        let mut block = BasicBlock::new(block_desc.addr);
        block.set_jump(block_desc.jump);
        block.set_fail(block_desc.fail);
        block.set_cases(block_desc.switch_op.clone());
        block.set_entry(block_desc.entry);
        block.set_exit(block_desc.exit);
        *block.container_mut() = body;
        func.add_block(block);
    }

    Ok(func)
}

/// Calling convention description: the registers carrying the first
/// arguments, in order.
#[derive(Debug, Clone)]
pub struct CallConv {
    /// Convention name as used by the host.
    pub name: &'static str,
    /// Argument registers in call order (empty for pure stack conventions).
    pub arg_registers: &'static [&'static str],
}

/// The architecture knowledge the core needs.
///
/// Everything instruction-level lives in the (external) lifter; the core
/// only needs the location registers to canonicalize between SSA waves and
/// the set of known calling conventions for call-site handling.
#[derive(Debug, Clone)]
pub struct ArchProfile {
    /// Architecture name as used by the host.
    pub name: &'static str,
    /// Native word size in bits.
    pub bits: u32,
    /// Stack pointer (and frame pointer) register names.
    pub stack_registers: &'static [&'static str],
    /// Flags register names.
    pub flag_registers: &'static [&'static str],
    /// Calling conventions this architecture supports.
    pub conventions: &'static [CallConv],
}

const X86: ArchProfile = ArchProfile {
    name: "x86",
    bits: 32,
    stack_registers: &["esp", "ebp"],
    flag_registers: &["eflags"],
    conventions: &[
        CallConv {
            name: "cdecl",
            arg_registers: &[],
        },
        CallConv {
            name: "fastcall",
            arg_registers: &["ecx", "edx"],
        },
    ],
};

const X64: ArchProfile = ArchProfile {
    name: "x64",
    bits: 64,
    stack_registers: &["rsp", "rbp"],
    flag_registers: &["rflags"],
    conventions: &[
        CallConv {
            name: "sysv",
            arg_registers: &["rdi", "rsi", "rdx", "rcx", "r8", "r9"],
        },
        CallConv {
            name: "ms",
            arg_registers: &["rcx", "rdx", "r8", "r9"],
        },
    ],
};

const ARM: ArchProfile = ArchProfile {
    name: "arm",
    bits: 32,
    stack_registers: &["sp", "fp"],
    flag_registers: &["cpsr"],
    conventions: &[CallConv {
        name: "aapcs",
        arg_registers: &["r0", "r1", "r2", "r3"],
    }],
};

const ARM64: ArchProfile = ArchProfile {
    name: "arm64",
    bits: 64,
    stack_registers: &["sp", "x29"],
    flag_registers: &["nzcv"],
    conventions: &[CallConv {
        name: "aapcs64",
        arg_registers: &["x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7"],
    }],
};

impl ArchProfile {
    /// Looks up the profile for a host architecture name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownArch`] for architectures without a lifter
    /// module; no decompilation is emitted for them.
    pub fn lookup(name: &str) -> Result<&'static ArchProfile> {
        match name {
            "x86" => Ok(&X86),
            "x64" | "amd64" | "x86_64" => Ok(&X64),
            "arm" => Ok(&ARM),
            "arm64" | "aarch64" => Ok(&ARM64),
            other => Err(Error::UnknownArch(other.to_string())),
        }
    }

    /// Resolves a calling convention by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCallConv`] when no handler matches; the
    /// caller fails the current function, not the whole run.
    pub fn calling_convention(&self, name: &str) -> Result<&CallConv> {
        self.conventions
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownCallConv(name.to_string()))
    }

    /// Every location-register name of this profile (stack pointers and
    /// flags), as owned strings for the propagation pass.
    #[must_use]
    pub fn location_registers(&self) -> Vec<String> {
        self.stack_registers
            .iter()
            .chain(self.flag_registers.iter())
            .map(|s| (*s).to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_lookup() {
        assert_eq!(ArchProfile::lookup("x64").unwrap().bits, 64);
        assert_eq!(ArchProfile::lookup("amd64").unwrap().name, "x64");
        assert!(matches!(
            ArchProfile::lookup("m88k"),
            Err(Error::UnknownArch(_))
        ));
    }

    #[test]
    fn test_calling_convention_lookup() {
        let x64 = ArchProfile::lookup("x64").unwrap();
        assert_eq!(
            x64.calling_convention("sysv").unwrap().arg_registers[0],
            "rdi"
        );
        assert!(matches!(
            x64.calling_convention("pascal"),
            Err(Error::UnknownCallConv(_))
        ));
    }

    #[test]
    fn test_location_registers() {
        let arm = ArchProfile::lookup("arm").unwrap();
        let regs = arm.location_registers();
        assert!(regs.contains(&"sp".to_string()));
        assert!(regs.contains(&"cpsr".to_string()));
    }

    #[test]
    fn test_descriptor_deserializes_from_host_json() {
        let json = r#"{
            "addr": 4096,
            "name": "entry0",
            "lower": 4096,
            "upper": 4160,
            "rettype": "int",
            "args": [
                {"name": "argc", "kind": "arg", "ref": "rdi", "type": "int"},
                {"name": "local_8h", "kind": "var",
                 "ref": {"base": "rbp", "offset": -8}, "type": "int64_t"}
            ],
            "blocks": [
                {"addr": 4096, "jump": 4112, "fail": 4104, "entry": true,
                 "instructions": [{"addr": 4096, "text": "test edi, edi"}]},
                {"addr": 4104, "jump": 4112},
                {"addr": 4112, "exit": true}
            ]
        }"#;

        let desc: FunctionDescriptor = serde_json::from_str(json).expect("valid descriptor");
        assert_eq!(desc.name, "entry0");
        assert_eq!(desc.args.len(), 2);
        assert_eq!(desc.args[0].kind, ArgKind::Arg);
        assert_eq!(
            desc.args[0].location,
            LocationRef::Register("rdi".to_string())
        );
        assert_eq!(
            desc.args[1].location,
            LocationRef::Frame {
                base: "rbp".to_string(),
                offset: -8
            }
        );
        assert_eq!(desc.blocks.len(), 3);
        assert_eq!(desc.blocks[0].jump, Some(4112));
        assert_eq!(desc.blocks[0].instructions.len(), 1);
        assert!(desc.blocks[2].exit);
    }

    #[test]
    fn test_build_function_from_descriptor() {
        let desc = FunctionDescriptor {
            addr: 0x1000,
            name: "main".to_string(),
            lower: 0x1000,
            upper: 0x1040,
            rettype: "int".to_string(),
            args: vec![ArgDescriptor {
                name: "argc".to_string(),
                kind: ArgKind::Arg,
                location: LocationRef::Register("rdi".to_string()),
                type_hint: "int".to_string(),
            }],
            blocks: vec![BlockDescriptor {
                addr: 0x1000,
                jump: None,
                fail: None,
                switch_op: Vec::new(),
                entry: true,
                exit: true,
                instructions: Vec::new(),
            }],
        };

        let func = build_function(&desc, vec![Container::new(0x1000)]).unwrap();
        assert_eq!(func.name(), "main");
        assert_eq!(func.return_type(), "int");
        assert_eq!(func.args().len(), 1);
        assert_eq!(func.blocks().len(), 1);
        assert!(func.block(0).unwrap().is_entry());
    }

    #[test]
    fn test_build_function_body_count_mismatch() {
        let desc = FunctionDescriptor {
            addr: 0,
            name: "broken".to_string(),
            lower: 0,
            upper: 0,
            rettype: String::new(),
            args: Vec::new(),
            blocks: vec![BlockDescriptor {
                addr: 0,
                jump: None,
                fail: None,
                switch_op: Vec::new(),
                entry: true,
                exit: true,
                instructions: Vec::new(),
            }],
        };
        assert!(build_function(&desc, Vec::new()).is_err());
    }
}
