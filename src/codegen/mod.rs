//! LLVM IR emission. The generator is a visitor over the checked AST that
//! returns [`WrappedValue`]s: an IR value, its Tak type, and whether the
//! value is a pointer to storage that must be loaded before use. The
//! casting context threads "the expected type at this site" through
//! expression emission.

pub mod constants;
pub mod controlflow;
pub mod declarations;
pub mod expressions;

use crate::ast::{Ast, AstKind, NodeId};
use crate::entity::{EntityFlags, EntityTable};
use crate::types::{Primitive, TypeData, TypeFlags, TypeKind};
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::targets::{InitializationConfig, Target, TargetMachine};
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType};
use inkwell::values::{BasicValueEnum, FunctionValue, PointerValue};
use inkwell::{AddressSpace, OptimizationLevel};
use std::collections::HashMap;

/// An IR value paired with its Tak type. `loadable` means the value is a
/// pointer (alloca, global, GEP) to the actual storage.
#[derive(Debug, Clone)]
pub struct WrappedValue<'ctx> {
    pub value: Option<BasicValueEnum<'ctx>>,
    pub ty: TypeData,
    pub loadable: bool,
}

impl<'ctx> WrappedValue<'ctx> {
    pub fn empty() -> Self {
        Self {
            value: None,
            ty: TypeData::default(),
            loadable: false,
        }
    }

    pub fn create(value: BasicValueEnum<'ctx>, ty: TypeData, loadable: bool) -> Self {
        Self {
            value: Some(value),
            ty,
            loadable,
        }
    }

    pub fn expect_value(&self) -> BasicValueEnum<'ctx> {
        self.value.expect("wrapped value holds an IR value")
    }

    pub fn expect_pointer(&self) -> PointerValue<'ctx> {
        self.expect_value().into_pointer_value()
    }
}

/// The "expected type here" signal consumed by literal lowering and
/// `maybe_adjust`.
#[derive(Clone)]
pub struct CastingContext<'ctx> {
    pub llvm_t: BasicTypeEnum<'ctx>,
    pub tak_t: TypeData,
}

pub struct ProcContext<'ctx> {
    pub func: FunctionValue<'ctx>,
    pub sym_index: u32,
}

#[derive(Clone, Copy)]
pub struct LoopContext<'ctx> {
    pub after: BasicBlock<'ctx>,
    pub merge: BasicBlock<'ctx>,
}

/// One defer frame; `loop_base` marks the innermost loop boundary that
/// `brk`/`cont` unpack up to.
pub struct DeferFrame {
    pub loop_base: bool,
    pub stmts: Vec<NodeId>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum DeferMode {
    Regular,
    UntilLoopBase,
    All,
}

pub struct CodegenContext<'ctx, 'a> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    pub target_machine: TargetMachine,
    pub tbl: &'a EntityTable,
    pub ast: &'a Ast,
    pub casting_context: Option<CastingContext<'ctx>>,
    pub curr_proc: Option<ProcContext<'ctx>>,
    pub curr_loop: Option<LoopContext<'ctx>>,
    pub deferred_stmts: Vec<DeferFrame>,
    locals: HashMap<String, WrappedValue<'ctx>>,
}

impl<'ctx, 'a> CodegenContext<'ctx, 'a> {
    pub fn new(
        context: &'ctx Context,
        module_name: &str,
        tbl: &'a EntityTable,
        ast: &'a Ast,
    ) -> Self {
        Target::initialize_native(&InitializationConfig::default())
            .expect("failed to initialize native compilation target");

        let triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&triple).expect("host triple resolves to a target");
        let target_machine = target
            .create_target_machine(
                &triple,
                TargetMachine::get_host_cpu_name().to_str().unwrap_or("generic"),
                TargetMachine::get_host_cpu_features().to_str().unwrap_or(""),
                OptimizationLevel::None,
                inkwell::targets::RelocMode::Default,
                inkwell::targets::CodeModel::Default,
            )
            .expect("host target machine is available");

        Self {
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            target_machine,
            tbl,
            ast,
            casting_context: None,
            curr_proc: None,
            curr_loop: None,
            deferred_stmts: Vec::new(),
            locals: HashMap::new(),
        }
    }

    // -- procedure / loop state ----------------------------------------------

    pub fn inside_procedure(&self) -> bool {
        self.curr_proc.is_some()
    }

    pub fn proc(&self) -> &ProcContext<'ctx> {
        self.curr_proc.as_ref().expect("inside a procedure")
    }

    pub fn enter_proc(&mut self, func: FunctionValue<'ctx>, sym_index: u32) {
        self.curr_proc = Some(ProcContext { func, sym_index });
    }

    pub fn leave_curr_proc(&mut self) {
        self.curr_proc = None;
        self.locals.clear();
    }

    pub fn inside_loop(&self) -> bool {
        self.curr_loop.is_some()
    }

    pub fn enter_loop(&mut self, ctx: Option<LoopContext<'ctx>>) {
        self.curr_loop = ctx;
    }

    pub fn leave_curr_loop(&mut self) -> Option<LoopContext<'ctx>> {
        self.curr_loop.take()
    }

    // -- locals ---------------------------------------------------------------

    pub fn set_local(&mut self, key: impl Into<String>, value: WrappedValue<'ctx>) {
        self.locals.insert(key.into(), value);
    }

    pub fn get_local(&self, key: &str) -> WrappedValue<'ctx> {
        self.locals
            .get(key)
            .cloned()
            .unwrap_or_else(|| panic!("local \"{}\" was registered", key))
    }

    pub fn local_exists(&self, key: &str) -> bool {
        self.locals.contains_key(key)
    }

    // -- casting context ------------------------------------------------------

    pub fn casting_context_exists(&self) -> bool {
        self.casting_context.is_some()
    }

    pub fn set_casting_context(&mut self, llvm_t: BasicTypeEnum<'ctx>, tak_t: TypeData) {
        assert!(
            self.casting_context.is_none(),
            "casting context is already set"
        );
        self.casting_context = Some(CastingContext { llvm_t, tak_t });
    }

    pub fn swap_casting_context(
        &mut self,
        llvm_t: BasicTypeEnum<'ctx>,
        tak_t: TypeData,
    ) -> Option<CastingContext<'ctx>> {
        self.casting_context
            .replace(CastingContext { llvm_t, tak_t })
    }

    pub fn delete_casting_context(&mut self) -> Option<CastingContext<'ctx>> {
        self.casting_context.take()
    }

    // -- defer stack ----------------------------------------------------------

    pub fn push_defers(&mut self, loop_base: bool) {
        self.deferred_stmts.push(DeferFrame {
            loop_base,
            stmts: Vec::new(),
        });
    }

    pub fn pop_defers(&mut self) {
        self.deferred_stmts.pop();
    }

    pub fn push_deferred_stmt(&mut self, node: NodeId) {
        self.deferred_stmts
            .last_mut()
            .expect("a defer frame is active")
            .stmts
            .push(node);
    }

    // -- block helpers --------------------------------------------------------

    pub fn curr_block_has_terminator(&self) -> bool {
        self.builder
            .get_insert_block()
            .and_then(|block| block.get_terminator())
            .is_some()
    }

    pub fn append_block(&self, name: &str) -> BasicBlock<'ctx> {
        self.context.append_basic_block(self.proc().func, name)
    }

    /// Allocas always go to the top of the entry block so every path can
    /// reach them.
    pub fn create_entry_alloca(&self, ty: BasicTypeEnum<'ctx>, name: &str) -> PointerValue<'ctx> {
        let entry = self
            .proc()
            .func
            .get_first_basic_block()
            .expect("procedure has an entry block");

        let tmp = self.context.create_builder();
        match entry.get_first_instruction() {
            Some(instr) => tmp.position_before(&instr),
            None => tmp.position_at_end(entry),
        }

        tmp.build_alloca(ty, name).unwrap()
    }

    pub fn ptr_t(&self) -> inkwell::types::PointerType<'ctx> {
        self.context.ptr_type(AddressSpace::default())
    }
}

// -- type lowering ------------------------------------------------------------

pub fn generate_primitive_type<'ctx>(
    ctx: &CodegenContext<'ctx, '_>,
    prim: Primitive,
) -> BasicTypeEnum<'ctx> {
    match prim {
        Primitive::U8 | Primitive::I8 => ctx.context.i8_type().into(),
        Primitive::U16 | Primitive::I16 => ctx.context.i16_type().into(),
        Primitive::U32 | Primitive::I32 => ctx.context.i32_type().into(),
        Primitive::U64 | Primitive::I64 => ctx.context.i64_type().into(),
        Primitive::F32 => ctx.context.f32_type().into(),
        Primitive::F64 => ctx.context.f64_type().into(),
        Primitive::Bool => ctx.context.bool_type().into(),
        Primitive::Void => panic!("generate_primitive_type: void is not a basic type"),
    }
}

pub fn create_struct_type_if_not_exists<'ctx>(
    ctx: &CodegenContext<'ctx, '_>,
    name: &str,
) -> inkwell::types::StructType<'ctx> {
    ctx.module
        .get_struct_type(name)
        .unwrap_or_else(|| ctx.context.opaque_struct_type(name))
}

/// Lowers a procedure signature to an LLVM function type.
pub fn generate_proc_signature<'ctx>(
    ctx: &CodegenContext<'ctx, '_>,
    ty: &TypeData,
) -> FunctionType<'ctx> {
    assert!(ty.kind == TypeKind::Procedure);

    let is_variadic = ty.flags.contains(TypeFlags::PROC_VARARGS);
    let mut parameters: Vec<BasicMetadataTypeEnum<'ctx>> = Vec::new();

    if let Some(params) = &ty.parameters {
        for param in params {
            parameters.push(generate_type(ctx, param).into());
        }
    }

    match &ty.return_type {
        Some(ret) => generate_type(ctx, ret).fn_type(&parameters, is_variadic),
        None => ctx.context.void_type().fn_type(&parameters, is_variadic),
    }
}

/// Lowers a Tak type to its IR representation: primitives to scalar types,
/// structs to named struct types, pointers to the opaque pointer. Array
/// shapes are outer-to-inner, so the wraps apply innermost-first and the
/// outermost dimension lands last.
pub fn generate_type<'ctx>(ctx: &CodegenContext<'ctx, '_>, ty: &TypeData) -> BasicTypeEnum<'ctx> {
    let mut gen_t: BasicTypeEnum<'ctx> = if ty.flags.contains(TypeFlags::POINTER) {
        ctx.ptr_t().into()
    } else {
        match ty.kind {
            TypeKind::Primitive => {
                generate_primitive_type(ctx, ty.primitive().expect("primitive kind has a tag"))
            }
            TypeKind::Struct => {
                create_struct_type_if_not_exists(ctx, ty.struct_name().expect("struct has a name"))
                    .into()
            }
            TypeKind::Procedure => {
                panic!("generate_type: naked procedure has no basic representation")
            }
            TypeKind::None => panic!("generate_type: untyped TypeData"),
        }
    };

    for len in ty.array_lengths.iter().rev() {
        gen_t = gen_t.array_type(*len).into();
    }

    gen_t
}

// -- module prologue ----------------------------------------------------------

/// Emits a zero-initialized global for every global symbol whose type is
/// not a naked procedure.
pub fn generate_global_placeholders(ctx: &CodegenContext<'_, '_>) {
    for sym in ctx.tbl.symbols.values() {
        if !sym.flags.contains(EntityFlags::GLOBAL)
            || sym.flags.contains(EntityFlags::PLACEHOLDER)
            || (sym.ty.kind == TypeKind::Procedure && !sym.ty.flags.contains(TypeFlags::POINTER))
        {
            continue;
        }

        // Initializers are attached when the declaration itself is
        // visited; struct bodies are not laid out yet at this point.
        let ty = generate_type(ctx, &sym.ty);
        let global = ctx.module.add_global(ty, None, &sym.name);

        global.set_constant(sym.ty.flags.contains(TypeFlags::CONSTANT));
        global.set_linkage(
            if sym.flags.contains(EntityFlags::FOREIGN) || sym.flags.contains(EntityFlags::FOREIGN_C)
            {
                Linkage::External
            } else {
                Linkage::Internal
            },
        );
    }
}

/// Emits a prototype for every procedure symbol. Generic templates are
/// never lowered.
pub fn generate_procedure_signatures(ctx: &CodegenContext<'_, '_>) {
    for sym in ctx.tbl.symbols.values() {
        if sym.ty.kind != TypeKind::Procedure
            || sym.ty.flags.contains(TypeFlags::POINTER)
            || sym.ty.flags.contains(TypeFlags::ARRAY)
            || sym.flags.contains(EntityFlags::GENERIC_BASE)
        {
            continue;
        }

        let signature = generate_proc_signature(ctx, &sym.ty);
        ctx.module.add_function(
            &sym.name,
            signature,
            Some(if sym.flags.contains(EntityFlags::INTERNAL) {
                Linkage::Internal
            } else {
                Linkage::External
            }),
        );
    }
}

/// Fills in the body of every non-template struct type.
pub fn generate_struct_layouts(ctx: &CodegenContext<'_, '_>) {
    for utype in ctx.tbl.types.values() {
        if !utype.generic_type_names.is_empty() {
            continue;
        }

        let struct_t = create_struct_type_if_not_exists(ctx, &utype.name);
        let elements: Vec<BasicTypeEnum> = utype
            .members
            .iter()
            .map(|member| generate_type(ctx, &member.ty))
            .collect();

        struct_t.set_body(&elements, false);
    }
}

// -- the visitor --------------------------------------------------------------

pub fn generate<'ctx>(node: NodeId, ctx: &mut CodegenContext<'ctx, '_>) -> WrappedValue<'ctx> {
    match ctx.ast.kind(node) {
        AstKind::Procdecl { .. } => declarations::generate_procdecl(node, ctx),
        AstKind::Vardecl { .. } => declarations::generate_vardecl(node, ctx),
        AstKind::SingletonLiteral { .. } => expressions::generate_singleton_literal(node, ctx),
        AstKind::Identifier { .. } => expressions::generate_identifier(node, ctx),
        AstKind::Binexpr { .. } => expressions::generate_binexpr(node, ctx),
        AstKind::Unaryexpr { .. } => expressions::generate_unaryexpr(node, ctx),
        AstKind::Subscript { .. } => expressions::generate_subscript(node, ctx),
        AstKind::MemberAccess { .. } => expressions::generate_member_access(node, ctx),
        AstKind::Call { .. } => expressions::generate_call(node, ctx),
        AstKind::Cast { .. } => expressions::generate_cast(node, ctx),
        AstKind::Sizeof { .. } => expressions::generate_sizeof(node, ctx),
        AstKind::Ret { .. } => controlflow::generate_ret(node, ctx),
        AstKind::Branch { .. } => controlflow::generate_branch(node, ctx),
        AstKind::For { .. } => controlflow::generate_for(node, ctx),
        AstKind::While { .. } => controlflow::generate_while(node, ctx),
        AstKind::DoWhile { .. } => controlflow::generate_dowhile(node, ctx),
        AstKind::Switch { .. } => controlflow::generate_switch(node, ctx),
        AstKind::Block { .. } => controlflow::generate_blk(node, ctx),
        AstKind::Brk => controlflow::generate_brk(ctx),
        AstKind::Cont => controlflow::generate_cont(ctx),
        AstKind::Defer { .. } | AstKind::DeferIf { .. } => controlflow::generate_defer(node, ctx),
        AstKind::NamespaceDecl { children, .. } => {
            let children = children.clone();
            generate_children(&children, ctx)
        }
        AstKind::EnumDef { namespace, .. } => {
            let namespace = *namespace;
            generate(namespace, ctx)
        }
        AstKind::BracedExpr { .. } => WrappedValue::empty(),
        other => panic!("generate: node {:?} is not generateable", other),
    }
}

pub fn generate_children<'ctx>(
    children: &[NodeId],
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    for child in children {
        if ctx.ast.kind(*child).needs_generating() {
            generate(*child, ctx);
        }
    }

    WrappedValue::empty()
}

/// Emits the whole module: prologue first (globals, prototypes, struct
/// layouts), then every top-level declaration.
pub fn generate_module<'ctx>(
    context: &'ctx Context,
    module_name: &str,
    tbl: &EntityTable,
    ast: &Ast,
    toplevel: &[NodeId],
) -> Module<'ctx> {
    let mut ctx = CodegenContext::new(context, module_name, tbl, ast);

    generate_global_placeholders(&ctx);
    generate_procedure_signatures(&ctx);
    generate_struct_layouts(&ctx);

    for node in toplevel {
        if ctx.ast.kind(*node).needs_generating() {
            generate(*node, &mut ctx);
        }
    }

    ctx.module
}
