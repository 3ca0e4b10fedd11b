//! Reference interpreter for pack IR.
//!
//! Executes an [`IrFunction`] against concrete pack lengths and records what
//! happens to storage. The interpreter exists to check lowering, not to run
//! programs: it tracks which slots of every allocation hold a live value and
//! rejects destruction of dead slots, re-initialization of live non-trivial
//! slots, and deallocation of packs that still hold live non-trivial
//! elements.
//!
//! Pack indices are resolved to flat slot numbers: a scalar component
//! occupies one slot and an expansion component occupies one slot per
//! element of its count archetype, in component order.

use pax_types::{EnvId, Idx, Pool, Shape, TypeData};
use rustc_hash::FxHashMap;

use crate::ir::{BlockId, BuiltinOp, Instr, IrFunction, Terminator, VarId};

/// Default instruction budget for one run.
pub const DEFAULT_FUEL: u64 = 1_000_000;

/// Identity of one allocation made during a run, in allocation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocId(pub u32);

/// An address: a whole allocation, or one slot of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub alloc: AllocId,
    pub slot: Option<u64>,
}

/// A runtime value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Word(u64),
    Bool(bool),
    /// Flat slot number within the pack the index was built for.
    PackIndex(u64),
    Addr(Location),
    /// Result of a call or aggregate; its contents are not modelled.
    Opaque(u64),
}

/// Observable effect recorded during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Destroy { alloc: AllocId, slot: Option<u64> },
    DeallocPack { alloc: AllocId },
    OpenPackElement { env: EnvId, index: u64 },
    Apply { func: String },
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Returned,
    Unwound,
}

/// The result of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trace {
    pub events: Vec<Event>,
    pub outcome: Outcome,
    live: FxHashMap<AllocId, Vec<bool>>,
}

impl Trace {
    /// Slots of `alloc` destroyed during the run, in destruction order.
    pub fn destroyed_slots(&self, alloc: AllocId) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Destroy { alloc: a, slot } if *a == alloc => *slot,
                _ => None,
            })
            .collect()
    }

    /// Number of `destroy_addr` executions, across all allocations.
    pub fn destroy_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Destroy { .. }))
            .count()
    }

    /// Number of `dealloc_pack` executions.
    pub fn dealloc_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::DeallocPack { .. }))
            .count()
    }

    /// Number of `open_pack_element` executions.
    pub fn open_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::OpenPackElement { .. }))
            .count()
    }

    /// Names of called functions, in call order.
    pub fn calls(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Apply { func } => Some(func.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Slots of `alloc` still live when the run ended.
    pub fn live_slots(&self, alloc: AllocId) -> Vec<u64> {
        self.live.get(&alloc).map_or_else(Vec::new, |slots| {
            slots
                .iter()
                .enumerate()
                .filter(|(_, &live)| live)
                .map(|(i, _)| i as u64)
                .collect()
        })
    }
}

/// A runtime failure of the interpreted IR.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InterpError {
    #[error("no length given for pack shape {0}")]
    UnknownLength(Shape),

    #[error("%{0} read before it was defined")]
    UndefinedVar(u32),

    #[error("%{var} has the wrong kind of value: expected {expected}, found {found:?}")]
    WrongValue {
        var: u32,
        expected: &'static str,
        found: Value,
    },

    #[error("pack index {index} is out of bounds for length {len}")]
    IndexOutOfBounds { index: u64, len: u64 },

    #[error("dynamic_pack_index needs a single-expansion pack, found {0}")]
    NotDynamicPack(String),

    #[error("slot {slot:?} of allocation {alloc:?} initialized twice")]
    DoubleInit { alloc: AllocId, slot: Option<u64> },

    #[error("slot {slot:?} of allocation {alloc:?} used while uninitialized")]
    UseOfDead { alloc: AllocId, slot: Option<u64> },

    #[error("pack {alloc:?} deallocated with live slots {live:?}")]
    DeallocLive { alloc: AllocId, live: Vec<u64> },

    #[error("branch to bb{target} passes {found} values for {expected} parameters")]
    ArityMismatch {
        target: u32,
        expected: usize,
        found: usize,
    },

    #[error("reached unreachable in bb{0}")]
    ReachedUnreachable(u32),

    #[error("ran out of fuel after {0} instructions")]
    OutOfFuel(u64),
}

struct Allocation {
    live: Vec<bool>,
    trivial: Vec<bool>,
}

/// Executes IR against concrete pack lengths.
pub struct Interpreter<'a> {
    pool: &'a Pool,
    lengths: FxHashMap<Shape, u64>,
    fuel: u64,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter. `lengths` maps each reduced shape to the
    /// runtime length of the packs of that shape.
    pub fn new(pool: &'a Pool, lengths: impl IntoIterator<Item = (Shape, u64)>) -> Self {
        Self {
            pool,
            lengths: lengths.into_iter().collect(),
            fuel: DEFAULT_FUEL,
        }
    }

    /// Override the instruction budget.
    #[must_use]
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = fuel;
        self
    }

    /// Run `func` from its entry block.
    pub fn run(&self, func: &IrFunction) -> Result<Trace, InterpError> {
        let mut run = Run {
            interp: self,
            vars: vec![None; func.var_types.len()],
            allocs: Vec::new(),
            events: Vec::new(),
            next_opaque: 0,
            steps: 0,
        };
        let outcome = run.execute(func)?;
        let live = run
            .allocs
            .into_iter()
            .enumerate()
            .map(|(i, a)| (AllocId(i as u32), a.live))
            .collect();
        Ok(Trace {
            events: run.events,
            outcome,
            live,
        })
    }

    // === Pack layout ===

    fn component_len(&self, component: Idx) -> Result<u64, InterpError> {
        if self.pool.is_expansion(component) {
            let shape = self.pool.expansion_shape(component);
            self.lengths
                .get(&shape)
                .copied()
                .ok_or(InterpError::UnknownLength(shape))
        } else {
            Ok(1)
        }
    }

    fn components(&self, ty: Idx) -> Option<&'a [Idx]> {
        match self.pool.data(ty) {
            TypeData::Pack(elems) | TypeData::LoweredPack(elems) | TypeData::Tuple(elems) => {
                Some(elems)
            }
            _ => None,
        }
    }

    fn total_len(&self, ty: Idx) -> Result<u64, InterpError> {
        match self.components(ty) {
            Some(elems) => elems
                .iter()
                .try_fold(0u64, |acc, &c| -> Result<u64, InterpError> {
                    Ok(acc + self.component_len(c)?)
                }),
            None => Ok(1),
        }
    }

    /// Triviality of every slot of storage of type `ty`.
    fn slot_triviality(&self, ty: Idx) -> Result<Vec<bool>, InterpError> {
        let Some(elems) = self.components(ty) else {
            return Ok(vec![self.pool.is_trivial(ty)]);
        };
        let mut slots = Vec::new();
        for &c in elems {
            let len = self.component_len(c)?;
            let trivial = self.pool.is_trivial(c);
            slots.extend(std::iter::repeat(trivial).take(len as usize));
        }
        Ok(slots)
    }

    fn component_offset(&self, pack: Idx, component: u32) -> Result<u64, InterpError> {
        let elems = self.components(pack).unwrap_or(&[]);
        elems
            .iter()
            .take(component as usize)
            .try_fold(0u64, |acc, &c| -> Result<u64, InterpError> {
                Ok(acc + self.component_len(c)?)
            })
    }
}

struct Run<'i, 'a> {
    interp: &'i Interpreter<'a>,
    vars: Vec<Option<Value>>,
    allocs: Vec<Allocation>,
    events: Vec<Event>,
    next_opaque: u64,
    steps: u64,
}

impl Run<'_, '_> {
    fn execute(&mut self, func: &IrFunction) -> Result<Outcome, InterpError> {
        let mut block = func.entry;
        loop {
            let bb = func.block(block);
            for instr in &bb.body {
                self.tick()?;
                self.step(instr)?;
            }
            self.tick()?;
            match &bb.terminator {
                Terminator::Branch { target, args } => {
                    self.jump(func, *target, args)?;
                    block = *target;
                }
                Terminator::CondBranch {
                    cond,
                    then_block,
                    else_block,
                } => {
                    block = if self.bool(*cond)? {
                        *then_block
                    } else {
                        *else_block
                    };
                }
                Terminator::Return { .. } => return Ok(Outcome::Returned),
                Terminator::Unwind => return Ok(Outcome::Unwound),
                Terminator::Unreachable => {
                    return Err(InterpError::ReachedUnreachable(block.raw()));
                }
            }
        }
    }

    fn tick(&mut self) -> Result<(), InterpError> {
        self.steps += 1;
        if self.steps > self.interp.fuel {
            return Err(InterpError::OutOfFuel(self.interp.fuel));
        }
        Ok(())
    }

    fn jump(&mut self, func: &IrFunction, target: BlockId, args: &[VarId]) -> Result<(), InterpError> {
        let params = &func.block(target).params;
        if params.len() != args.len() {
            return Err(InterpError::ArityMismatch {
                target: target.raw(),
                expected: params.len(),
                found: args.len(),
            });
        }
        let values = args
            .iter()
            .map(|&a| self.get(a))
            .collect::<Result<Vec<_>, _>>()?;
        for (&(param, _), value) in params.iter().zip(values) {
            self.set(param, value);
        }
        Ok(())
    }

    fn step(&mut self, instr: &Instr) -> Result<(), InterpError> {
        let interp = self.interp;
        match instr {
            Instr::IntegerLiteral { dst, ty, value } => {
                let v = if *ty == Idx::INT1 {
                    Value::Bool(*value != 0)
                } else {
                    Value::Word(*value)
                };
                self.set(*dst, v);
            }
            Instr::Builtin { dst, op, args } => {
                let lhs = self.word(args[0])?;
                let rhs = self.word(args[1])?;
                let v = match op {
                    BuiltinOp::Add => Value::Word(lhs.wrapping_add(rhs)),
                    BuiltinOp::Sub => Value::Word(lhs.wrapping_sub(rhs)),
                    BuiltinOp::CmpEq => Value::Bool(lhs == rhs),
                };
                self.set(*dst, v);
            }
            Instr::AllocPack { dst, pack_ty: ty } | Instr::AllocStack { dst, ty } => {
                let trivial = interp.slot_triviality(*ty)?;
                let loc = self.allocate(trivial);
                self.set(*dst, Value::Addr(loc));
            }
            Instr::DeallocPack { addr } => {
                let loc = self.addr(*addr)?;
                let alloc = &self.allocs[loc.alloc.0 as usize];
                let live: Vec<u64> = alloc
                    .live
                    .iter()
                    .zip(&alloc.trivial)
                    .enumerate()
                    .filter(|(_, (&l, &trivial))| l && !trivial)
                    .map(|(i, _)| i as u64)
                    .collect();
                if !live.is_empty() {
                    return Err(InterpError::DeallocLive {
                        alloc: loc.alloc,
                        live,
                    });
                }
                self.events.push(Event::DeallocPack { alloc: loc.alloc });
            }
            Instr::PackLength { dst, pack_ty } => {
                let len = interp.total_len(*pack_ty)?;
                self.set(*dst, Value::Word(len));
            }
            Instr::ScalarPackIndex {
                dst,
                component,
                pack_ty,
            } => {
                let offset = interp.component_offset(*pack_ty, *component)?;
                self.set(*dst, Value::PackIndex(offset));
            }
            Instr::DynamicPackIndex {
                dst,
                index,
                pack_ty,
            } => {
                let elems = interp.components(*pack_ty).unwrap_or(&[]);
                if elems.len() != 1 || !interp.pool.is_expansion(elems[0]) {
                    return Err(InterpError::NotDynamicPack(
                        interp.pool.format_type(*pack_ty),
                    ));
                }
                let len = interp.component_len(elems[0])?;
                let i = self.word(*index)?;
                if i >= len {
                    return Err(InterpError::IndexOutOfBounds { index: i, len });
                }
                self.set(*dst, Value::PackIndex(i));
            }
            Instr::PackPackIndex {
                dst,
                component,
                inner,
                pack_ty,
            } => {
                let inner = self.pack_index(*inner)?;
                let component_ty = interp
                    .components(*pack_ty)
                    .and_then(|elems| elems.get(*component as usize).copied())
                    .unwrap_or(Idx::UNIT);
                let len = interp.component_len(component_ty)?;
                if inner >= len {
                    return Err(InterpError::IndexOutOfBounds { index: inner, len });
                }
                let offset = interp.component_offset(*pack_ty, *component)?;
                self.set(*dst, Value::PackIndex(offset + inner));
            }
            Instr::PackElementGet {
                dst, index, pack, ..
            } => {
                let loc = self.element(*pack, *index)?;
                self.set(*dst, Value::Addr(loc));
            }
            Instr::TuplePackElementAddr {
                dst, index, tuple, ..
            } => {
                let loc = self.element(*tuple, *index)?;
                self.set(*dst, Value::Addr(loc));
            }
            Instr::OpenPackElement { index, env } => {
                let index = self.pack_index(*index)?;
                self.events.push(Event::OpenPackElement { env: *env, index });
            }
            Instr::DestroyAddr { addr } => {
                let loc = self.addr(*addr)?;
                self.kill(loc)?;
                self.events.push(Event::Destroy {
                    alloc: loc.alloc,
                    slot: loc.slot,
                });
            }
            Instr::Apply { dst, func, .. } => {
                self.events.push(Event::Apply { func: func.clone() });
                let v = self.opaque();
                self.set(*dst, v);
            }
            Instr::Tuple { dst, .. } => {
                let v = self.opaque();
                self.set(*dst, v);
            }
            Instr::Store { value, addr } => {
                self.get(*value)?;
                let loc = self.addr(*addr)?;
                self.init(loc)?;
            }
            Instr::CopyAddr { src, dest } => {
                let src = self.addr(*src)?;
                self.require_live(src)?;
                let dest = self.addr(*dest)?;
                self.init(dest)?;
            }
        }
        Ok(())
    }

    // === Storage ===

    fn allocate(&mut self, trivial: Vec<bool>) -> Location {
        let alloc = AllocId(self.allocs.len() as u32);
        self.allocs.push(Allocation {
            live: vec![false; trivial.len()],
            trivial,
        });
        Location { alloc, slot: None }
    }

    fn slots(&self, loc: Location) -> std::ops::Range<usize> {
        match loc.slot {
            Some(s) => s as usize..s as usize + 1,
            None => 0..self.allocs[loc.alloc.0 as usize].live.len(),
        }
    }

    fn init(&mut self, loc: Location) -> Result<(), InterpError> {
        let range = self.slots(loc);
        let alloc = &mut self.allocs[loc.alloc.0 as usize];
        let overwrites_live = range
            .clone()
            .any(|i| alloc.live[i] && !alloc.trivial[i]);
        if overwrites_live {
            return Err(InterpError::DoubleInit {
                alloc: loc.alloc,
                slot: loc.slot,
            });
        }
        alloc.live[range].iter_mut().for_each(|l| *l = true);
        Ok(())
    }

    fn require_live(&self, loc: Location) -> Result<(), InterpError> {
        let range = self.slots(loc);
        if self.allocs[loc.alloc.0 as usize].live[range]
            .iter()
            .all(|&l| l)
        {
            Ok(())
        } else {
            Err(InterpError::UseOfDead {
                alloc: loc.alloc,
                slot: loc.slot,
            })
        }
    }

    fn kill(&mut self, loc: Location) -> Result<(), InterpError> {
        self.require_live(loc)?;
        let range = self.slots(loc);
        self.allocs[loc.alloc.0 as usize].live[range]
            .iter_mut()
            .for_each(|l| *l = false);
        Ok(())
    }

    fn element(&self, base: VarId, index: VarId) -> Result<Location, InterpError> {
        let base = self.addr(base)?;
        let index = self.pack_index(index)?;
        let len = self.allocs[base.alloc.0 as usize].live.len() as u64;
        if index >= len {
            return Err(InterpError::IndexOutOfBounds { index, len });
        }
        Ok(Location {
            alloc: base.alloc,
            slot: Some(index),
        })
    }

    // === Variables ===

    fn opaque(&mut self) -> Value {
        self.next_opaque += 1;
        Value::Opaque(self.next_opaque)
    }

    fn set(&mut self, var: VarId, value: Value) {
        self.vars[var.index()] = Some(value);
    }

    fn get(&self, var: VarId) -> Result<Value, InterpError> {
        self.vars[var.index()].ok_or(InterpError::UndefinedVar(var.raw()))
    }

    fn word(&self, var: VarId) -> Result<u64, InterpError> {
        match self.get(var)? {
            Value::Word(w) => Ok(w),
            found => Err(InterpError::WrongValue {
                var: var.raw(),
                expected: "word",
                found,
            }),
        }
    }

    fn bool(&self, var: VarId) -> Result<bool, InterpError> {
        match self.get(var)? {
            Value::Bool(b) => Ok(b),
            found => Err(InterpError::WrongValue {
                var: var.raw(),
                expected: "bool",
                found,
            }),
        }
    }

    fn pack_index(&self, var: VarId) -> Result<u64, InterpError> {
        match self.get(var)? {
            Value::PackIndex(i) => Ok(i),
            found => Err(InterpError::WrongValue {
                var: var.raw(),
                expected: "pack index",
                found,
            }),
        }
    }

    fn addr(&self, var: VarId) -> Result<Location, InterpError> {
        match self.get(var)? {
            Value::Addr(loc) => Ok(loc),
            found => Err(InterpError::WrongValue {
                var: var.raw(),
                expected: "address",
                found,
            }),
        }
    }
}
