//! Synthesis lowering: turns the evaluated block into an HDL netlist.
//!
//! Standard signals (clock, enables, reset) become entity ports or tie to
//! the rails; aggregate block I/O packs into flat entity ports with buffer
//! and combiner devices at the boundary; every evaluator variable gets a
//! signal; and each undriven variable's value expression lowers to one
//! device per node.

use std::collections::{HashMap, HashSet};

use crate::ast::{BlockFlag, BlockId};
use crate::bitconst::BitConstant;
use crate::error::{EvalError, EvalResult};
use crate::eval::vars::{EvalVarId, EvalVarKind};
use crate::eval::{EvalObject, Evaluator, ObjId, SpecialOperation};
use crate::hdl::{HdlDesign, HdlPortType, PortDirection, SignalId};
use crate::ops::OperationType;

/// Everything synthesis produced for one hardware block.
pub struct SynthContext {
    /// The netlist.
    pub design: HdlDesign,
    /// Clock signal, or the ground rail for unclocked blocks.
    pub clock: SignalId,
    /// Clock enable, or the power rail.
    pub clock_enable: SignalId,
    /// Input data-valid, or the power rail.
    pub input_valid: SignalId,
    /// Output data-valid; exported only when the block requested it.
    pub output_valid: SignalId,
    /// Synchronous reset, or the ground rail.
    pub reset: SignalId,
    /// Signal carrying each evaluator variable.
    pub var_signals: HashMap<EvalVarId, SignalId>,
    driven: HashSet<EvalVarId>,
}

/// Lowers an evaluated hardware block into a netlist.
pub fn make_hdl_design(eval: &mut Evaluator, block: BlockId) -> EvalResult<SynthContext> {
    let blk = eval.ast.blocks[block.0].clone();
    let mut design = HdlDesign::new(blk.name.clone());

    let clock = if blk.flags.contains(BlockFlag::Clock) {
        let s = design.add_signal("clock", HdlPortType::Clock);
        design.add_port(s, PortDirection::Input);
        s
    } else {
        design.gnd
    };
    let clock_enable = if blk.flags.contains(BlockFlag::ClockEnable) {
        let s = design.add_signal("clken", HdlPortType::Logic);
        design.add_port(s, PortDirection::Input);
        s
    } else {
        design.vcc
    };
    let input_valid = if blk.flags.contains(BlockFlag::InputValid) {
        let s = design.add_signal("input_valid", HdlPortType::Logic);
        design.add_port(s, PortDirection::Input);
        s
    } else {
        design.vcc
    };
    let reset = if blk.flags.contains(BlockFlag::SyncReset) {
        let s = design.add_signal("reset", HdlPortType::Logic);
        design.add_port(s, PortDirection::Input);
        s
    } else {
        design.gnd
    };
    let output_valid = design.add_signal("output_valid", HdlPortType::Logic);
    if blk.flags.contains(BlockFlag::OutputValid) {
        design.add_port(output_valid, PortDirection::Output);
    }

    let mut sc = SynthContext {
        design,
        clock,
        clock_enable,
        input_valid,
        output_valid,
        reset,
        var_signals: HashMap::new(),
        driven: HashSet::new(),
    };

    for &input in &blk.inputs {
        let id = eval.evaluator_variable(input).ok_or_else(|| {
            EvalError::internal("block input was never bound by the evaluator")
        })?;
        pack_input(eval, &mut sc, id)?;
    }
    for &output in &blk.outputs {
        let id = eval.evaluator_variable(output).ok_or_else(|| {
            EvalError::internal("block output was never bound by the evaluator")
        })?;
        pack_output(eval, &mut sc, id)?;
    }

    // remaining variables: port children of memories and streams surface
    // on the entity, everything else becomes an internal signal
    for id in eval.variable_ids().collect::<Vec<_>>() {
        if sc.var_signals.contains_key(&id) || sc.driven.contains(&id) {
            continue;
        }
        let var = eval.var(id);
        let ty = match var.ty.hdl_type() {
            Ok(ty) => ty,
            Err(_) => {
                // memory and stream containers exist only through their
                // port children
                sc.driven.insert(id);
                continue;
            }
        };
        let name = var.name.clone();
        let (is_toplevel, is_input) = (var.dir.is_toplevel, var.dir.is_input);
        let sig = sc.design.add_signal(name, ty);
        sc.var_signals.insert(id, sig);
        if is_toplevel {
            let dir = if is_input && !eval.var(id).dir.is_output {
                PortDirection::Input
            } else {
                PortDirection::Output
            };
            sc.design.add_port(sig, dir);
            if dir == PortDirection::Input {
                sc.driven.insert(id);
            }
        }
    }

    // static scalars hold their value in a register gated by
    // write-enable, data-enable and clock-enable
    for id in eval.variable_ids().collect::<Vec<_>>() {
        let (wren, wrval) = match &eval.var(id).kind {
            EvalVarKind::Scalar {
                is_static: true,
                write_enable: Some(wren),
                written_value: Some(wrval),
            } => (*wren, *wrval),
            _ => continue,
        };
        let sig = sc.var_signals[&id];
        let wren_sig = sc.var_signals[&wren];
        let wrval_sig = sc.var_signals[&wrval];
        let gate1 = sc.design.temp_signal("enable", HdlPortType::Logic);
        sc.design
            .add_operation(OperationType::BwAnd, &[wren_sig, sc.input_valid], gate1);
        let gate2 = sc.design.temp_signal("enable", HdlPortType::Logic);
        sc.design
            .add_operation(OperationType::BwAnd, &[gate1, sc.clock_enable], gate2);
        sc.design
            .add_register(wrval_sig, sc.clock, sig, gate2, sc.reset, false);
        sc.design.signal_mut(sig).clock_domain = Some(sc.clock);
        sc.driven.insert(id);
    }

    // drive every remaining variable from its final value expression
    for id in eval.variable_ids().collect::<Vec<_>>() {
        if sc.driven.contains(&id) || eval.var(id).dir.is_input {
            continue;
        }
        let Some(&target) = sc.var_signals.get(&id) else {
            continue;
        };
        let value = eval.value_for(id);
        let default = eval.var(id).default_value.clone();
        synthesize_value(eval, &mut sc, value, target, default.as_ref())?;
        sc.driven.insert(id);
    }

    // single-cycle blocks pass data validity straight through
    let iv = sc.input_valid;
    let ov = sc.output_valid;
    sc.design.add_buffer(iv, ov, None);

    Ok(sc)
}

/// A signal carrying the value of `obj`: variables reuse their signal,
/// everything else lowers into a fresh temporary.
fn operand_signal(
    eval: &mut Evaluator,
    sc: &mut SynthContext,
    obj: ObjId,
    prefix: &str,
    default: Option<&BitConstant>,
) -> EvalResult<SignalId> {
    if let EvalObject::Variable(v) = eval.obj(obj) {
        if let Some(&sig) = sc.var_signals.get(v) {
            return Ok(sig);
        }
    }
    let ty = eval.data_type(obj)?.hdl_type()?;
    let tmp = sc.design.temp_signal(prefix, ty);
    synthesize_value(eval, sc, obj, tmp, default)?;
    Ok(tmp)
}

/// Lowers one value expression, driving `target`. `default` substitutes
/// don't-care leaves.
pub fn synthesize_value(
    eval: &mut Evaluator,
    sc: &mut SynthContext,
    obj: ObjId,
    target: SignalId,
    default: Option<&BitConstant>,
) -> EvalResult<()> {
    match eval.obj(obj).clone() {
        EvalObject::Null => Err(EvalError::internal("null in evaluation tree")),
        EvalObject::Constant(value) => {
            sc.design.add_constant(value, target);
            Ok(())
        }
        EvalObject::DontCare(_) => {
            let value = default.cloned().unwrap_or_else(BitConstant::zero);
            sc.design.add_constant(value, target);
            Ok(())
        }
        EvalObject::Variable(v) => {
            let src = sc.var_signals.get(&v).copied().ok_or_else(|| {
                EvalError::internal(format!(
                    "variable ==={}=== has no signal",
                    eval.var(v).name
                ))
            })?;
            sc.design.add_buffer(src, target, None);
            Ok(())
        }
        EvalObject::Cast { operand, .. } => {
            let src = operand_signal(eval, sc, operand, "cast_in", default)?;
            sc.design.add_buffer(src, target, None);
            Ok(())
        }
        EvalObject::Operation { op, operands } => {
            if matches!(op, OperationType::Div | OperationType::Mod) {
                return Err(EvalError::new(
                    "division and modulo are not synthesisable; rewrite using shifts and multiplies",
                ));
            }
            if op.is_assignment() {
                return Err(EvalError::internal(
                    "assignment operation reached synthesis",
                ));
            }
            let mut inputs = Vec::with_capacity(operands.len());
            for operand in operands {
                inputs.push(operand_signal(eval, sc, operand, "op_in", None)?);
            }
            sc.design.add_operation(op, &inputs, target);
            Ok(())
        }
        EvalObject::Special { op, operands, .. } => match op {
            SpecialOperation::Cond => {
                let sel = operand_signal(eval, sc, operands[0], "mux_sel", None)?;
                let true_sig = operand_signal(eval, sc, operands[1], "mux_in", default)?;
                let false_sig = operand_signal(eval, sc, operands[2], "mux_in", default)?;
                sc.design
                    .add_multiplexer(&[false_sig, true_sig], sel, target);
                Ok(())
            }
            _ => Err(EvalError::new(
                "non-constant array indices are not yet implemented",
            )),
        },
        EvalObject::Register { input } => {
            let src = operand_signal(eval, sc, input, "reg_in", default)?;
            sc.design
                .add_register(src, sc.clock, target, sc.clock_enable, sc.reset, true);
            sc.design.signal_mut(target).clock_domain = Some(sc.clock);
            Ok(())
        }
        EvalObject::Array { ty, items } => {
            let element_width = ty.base.width();
            let mut inputs = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let sig = operand_signal(eval, sc, item, "elem", default)?;
                inputs.push((sig, i * element_width));
            }
            sc.design.add_combiner(&inputs, target);
            Ok(())
        }
        EvalObject::Struct { ty, items } => {
            let mut inputs = Vec::with_capacity(items.len());
            let mut offset = 0usize;
            for ((_, item), (_, member_ty)) in items.into_iter().zip(&ty.members) {
                let sig = operand_signal(eval, sc, item, "member", default)?;
                inputs.push((sig, offset));
                offset += member_ty.width();
            }
            sc.design.add_combiner(&inputs, target);
            Ok(())
        }
        EvalObject::ArrayAccess { .. } | EvalObject::StructAccess { .. } => Err(
            EvalError::internal("unresolved access expression reached synthesis"),
        ),
    }
}

fn scalar_leaves(eval: &Evaluator, id: EvalVarId) -> Vec<EvalVarId> {
    match &eval.var(id).kind {
        EvalVarKind::Scalar { .. } => vec![id],
        EvalVarKind::Array { items } => items
            .iter()
            .flat_map(|&item| scalar_leaves(eval, item))
            .collect(),
        EvalVarKind::Structure { members } => members
            .iter()
            .flat_map(|&(_, member)| scalar_leaves(eval, member))
            .collect(),
        // memory and stream children surface as standalone ports
        EvalVarKind::Memory { .. } | EvalVarKind::Stream { .. } => Vec::new(),
    }
}

fn aggregate_descendants(eval: &Evaluator, id: EvalVarId) -> Vec<EvalVarId> {
    let children: Vec<EvalVarId> = match &eval.var(id).kind {
        EvalVarKind::Array { items } => items.clone(),
        EvalVarKind::Structure { members } => members.iter().map(|&(_, m)| m).collect(),
        _ => Vec::new(),
    };
    let mut out = Vec::new();
    for child in children {
        if !eval.var(child).is_scalar() {
            out.push(child);
            out.extend(aggregate_descendants(eval, child));
        }
    }
    out
}

/// Packs one block input: scalars become typed entity ports directly;
/// aggregates become one flat port with per-leaf slice buffers.
fn pack_input(eval: &mut Evaluator, sc: &mut SynthContext, id: EvalVarId) -> EvalResult<()> {
    match &eval.var(id).kind {
        EvalVarKind::Scalar { .. } => {
            let ty = eval.var(id).ty.hdl_type()?;
            let name = eval.var(id).name.clone();
            let sig = sc.design.add_signal(name, ty);
            sc.design.add_port(sig, PortDirection::Input);
            sc.var_signals.insert(id, sig);
            sc.driven.insert(id);
            Ok(())
        }
        EvalVarKind::Array { .. } | EvalVarKind::Structure { .. } => {
            eval.set_bit_offset(id, 0);
            let width = eval.var(id).ty.width();
            let name = eval.var(id).name.clone();
            let port_sig = sc.design.add_signal(name, HdlPortType::LogicVector(width));
            sc.design.add_port(port_sig, PortDirection::Input);
            sc.var_signals.insert(id, port_sig);
            sc.driven.insert(id);
            for leaf in scalar_leaves(eval, id) {
                let leaf_ty = eval.var(leaf).ty.hdl_type()?;
                let leaf_name = eval.var(leaf).name.clone();
                let leaf_width = eval.var(leaf).ty.width();
                let leaf_offset = eval.var(leaf).bit_offset;
                let leaf_sig = sc.design.add_signal(leaf_name, leaf_ty);
                sc.design
                    .add_buffer(port_sig, leaf_sig, Some((leaf_offset, leaf_width)));
                sc.var_signals.insert(leaf, leaf_sig);
                sc.driven.insert(leaf);
            }
            for aggregate in aggregate_descendants(eval, id) {
                sc.var_signals.insert(aggregate, port_sig);
                sc.driven.insert(aggregate);
            }
            Ok(())
        }
        // memory and stream inputs surface through their port children
        EvalVarKind::Memory { .. } | EvalVarKind::Stream { .. } => {
            sc.driven.insert(id);
            Ok(())
        }
    }
}

/// Packs one block output: the mirror of [`pack_input`], with one
/// combiner gathering the leaf slices.
fn pack_output(eval: &mut Evaluator, sc: &mut SynthContext, id: EvalVarId) -> EvalResult<()> {
    match &eval.var(id).kind {
        EvalVarKind::Scalar { .. } => {
            let ty = eval.var(id).ty.hdl_type()?;
            let name = eval.var(id).name.clone();
            let sig = sc.design.add_signal(name, ty);
            sc.design.add_port(sig, PortDirection::Output);
            sc.var_signals.insert(id, sig);
            Ok(())
        }
        EvalVarKind::Array { .. } | EvalVarKind::Structure { .. } => {
            eval.set_bit_offset(id, 0);
            let width = eval.var(id).ty.width();
            let name = eval.var(id).name.clone();
            let port_sig = sc.design.add_signal(name, HdlPortType::LogicVector(width));
            sc.design.add_port(port_sig, PortDirection::Output);
            sc.var_signals.insert(id, port_sig);
            sc.driven.insert(id);
            let mut combiner_inputs = Vec::new();
            for leaf in scalar_leaves(eval, id) {
                let leaf_ty = eval.var(leaf).ty.hdl_type()?;
                let leaf_name = eval.var(leaf).name.clone();
                let leaf_offset = eval.var(leaf).bit_offset;
                let leaf_sig = sc.design.add_signal(leaf_name, leaf_ty);
                sc.var_signals.insert(leaf, leaf_sig);
                combiner_inputs.push((leaf_sig, leaf_offset));
            }
            sc.design.add_combiner(&combiner_inputs, port_sig);
            for aggregate in aggregate_descendants(eval, id) {
                sc.var_signals.insert(aggregate, port_sig);
                sc.driven.insert(aggregate);
            }
            Ok(())
        }
        EvalVarKind::Memory { .. } | EvalVarKind::Stream { .. } => {
            sc.driven.insert(id);
            Ok(())
        }
    }
}
