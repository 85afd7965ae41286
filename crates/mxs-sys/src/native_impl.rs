//! Pure-Rust implementation of the `mxs_*` C ABI functions.
//!
//! Serves a fixed operator table and keeps symbols as boxed Rust structs
//! cast through the zero-sized marker types. Parameter handling follows the
//! external engine closely enough for the bindings to be exercised end to
//! end: required parameters are enforced at creation, and the key-variadic
//! count must match the number of composed inputs.
//!
//! # Safety
//!
//! All functions in this module follow C ABI conventions: callers must pass
//! valid pointers obtained from other `mxs_*` functions (or valid
//! NUL-terminated strings). Symbols must be freed exactly once via
//! `mxs_symbol_free`.

#![allow(clippy::missing_safety_doc)]

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::sync::LazyLock;

use libc::{c_char, c_int};

use crate::{mx_uint, mxs_op_t, mxs_symbol_t};

// ── Operator table ──────────────────────────────────────────────────────

struct OpDef {
    name: &'static str,
    description: &'static str,
    /// `(name, type tag, description)`
    args: &'static [(&'static str, &'static str, &'static str)],
    key_var_num_args: &'static str,
}

const NODE: &str = "NDArray-or-Symbol";
const NODES: &str = "NDArray-or-Symbol[]";

const OP_DEFS: &[OpDef] = &[
    OpDef {
        name: "elemwise_add",
        description: "Adds arguments element-wise.",
        args: &[("lhs", NODE, "first input"), ("rhs", NODE, "second input")],
        key_var_num_args: "",
    },
    OpDef {
        name: "Concat",
        description: "Joins input arrays along a given axis.",
        args: &[
            ("data", NODES, "List of arrays to concatenate"),
            ("num_args", "int, required", "Number of inputs to be concated."),
            ("dim", "int, optional, default='1'", "the dimension to be concated."),
        ],
        key_var_num_args: "num_args",
    },
    OpDef {
        name: "add_n",
        description: "Adds all input arguments element-wise.",
        args: &[
            ("args", NODES, "Positional input arguments"),
            ("num_args", "int, required", "Number of inputs to be summed."),
        ],
        key_var_num_args: "num_args",
    },
    OpDef {
        name: "FullyConnected",
        description: "Applies a linear transformation: Y = XW^T + b.",
        args: &[
            ("data", NODE, "Input data."),
            ("weight", NODE, "Weight matrix."),
            ("bias", NODE, "Bias parameter."),
            ("num_hidden", "int, required", "Number of hidden nodes of the output."),
            ("no_bias", "boolean, optional, default=0", "Whether to disable bias parameter."),
            ("flatten", "boolean, optional, default=1", "Whether to collapse all but the first axis."),
        ],
        key_var_num_args: "",
    },
    OpDef {
        name: "Cast",
        description: "Casts all elements of the input to a new type.",
        args: &[
            ("data", NODE, "The input."),
            (
                "dtype",
                "{'bfloat16', 'bool', 'float16', 'float32', 'float64', 'int32', 'int64', 'int8', 'uint8'}, required",
                "Output data type.",
            ),
        ],
        key_var_num_args: "",
    },
    OpDef {
        name: "_contrib_quadratic",
        description: "Computes f(x) = ax^2+bx+c element-wise.",
        args: &[
            ("data", NODE, "Input ndarray"),
            ("a", "float, optional, default=0", "Coefficient of the quadratic term."),
            ("b", "float, optional, default=0", "Coefficient of the linear term."),
            ("c", "float, optional, default=0", "Constant term."),
        ],
        key_var_num_args: "",
    },
    OpDef {
        name: "_copy",
        description: "Returns a copy of the input.",
        args: &[("data", NODE, "The input array.")],
        key_var_num_args: "",
    },
];

/// Array of C string pointers into CStrings owned by the same `NativeOp`.
struct PtrArray(Vec<*const c_char>);

// SAFETY: the pointers reference immutable CStrings that live as long as the
// static operator table and are never written through.
unsafe impl Send for PtrArray {}
unsafe impl Sync for PtrArray {}

impl PtrArray {
    fn of(strings: &[CString]) -> Self {
        Self(strings.iter().map(|s| s.as_ptr()).collect())
    }
}

struct NativeOp {
    name: CString,
    description: CString,
    arg_names: Vec<CString>,
    arg_types: Vec<CString>,
    // Owns the strings behind `desc_ptrs`.
    #[allow(dead_code)]
    arg_descs: Vec<CString>,
    key_var_num_args: CString,
    return_type: CString,
    name_ptrs: PtrArray,
    type_ptrs: PtrArray,
    desc_ptrs: PtrArray,
}

impl NativeOp {
    fn new(def: &OpDef) -> Self {
        let cstr = |s: &str| CString::new(s).unwrap_or_default();
        let arg_names: Vec<CString> = def.args.iter().map(|a| cstr(a.0)).collect();
        let arg_types: Vec<CString> = def.args.iter().map(|a| cstr(a.1)).collect();
        let arg_descs: Vec<CString> = def.args.iter().map(|a| cstr(a.2)).collect();
        Self {
            name: cstr(def.name),
            description: cstr(def.description),
            name_ptrs: PtrArray::of(&arg_names),
            type_ptrs: PtrArray::of(&arg_types),
            desc_ptrs: PtrArray::of(&arg_descs),
            arg_names,
            arg_types,
            arg_descs,
            key_var_num_args: cstr(def.key_var_num_args),
            return_type: cstr(NODE),
        }
    }

    fn name(&self) -> &str {
        self.name.to_str().unwrap_or_default()
    }

    fn args(&self) -> impl Iterator<Item = (&str, &str)> {
        self.arg_names.iter().zip(&self.arg_types).map(|(n, t)| {
            (
                n.to_str().unwrap_or_default(),
                t.to_str().unwrap_or_default(),
            )
        })
    }

    fn is_node(type_tag: &str) -> bool {
        type_tag.starts_with("NDArray") || type_tag.starts_with("Symbol")
    }

    fn has_variadic_input(&self) -> bool {
        self.args().any(|(_, t)| Self::is_node(t) && t.ends_with("[]"))
    }

    fn key_var(&self) -> Option<&str> {
        let key = self.key_var_num_args.to_str().unwrap_or_default();
        (!key.is_empty()).then_some(key)
    }
}

static OPS: LazyLock<Vec<NativeOp>> = LazyLock::new(|| OP_DEFS.iter().map(NativeOp::new).collect());

struct OpPtrArray(Vec<*mut mxs_op_t>);

// SAFETY: the pointers reference elements of the immutable static `OPS`.
unsafe impl Send for OpPtrArray {}
unsafe impl Sync for OpPtrArray {}

static OP_PTRS: LazyLock<OpPtrArray> = LazyLock::new(|| {
    OpPtrArray(
        OPS.iter()
            .map(|op| op as *const NativeOp as *mut mxs_op_t)
            .collect(),
    )
});

// ── Symbols ─────────────────────────────────────────────────────────────

struct NativeSymbol {
    op: Option<&'static NativeOp>,
    name: CString,
    params: Vec<(CString, CString)>,
    inputs: Vec<String>,
    composed: bool,
}

fn box_symbol(sym: NativeSymbol) -> *mut mxs_symbol_t {
    Box::into_raw(Box::new(sym)) as *mut mxs_symbol_t
}

unsafe fn ref_symbol<'a>(p: *mut mxs_symbol_t) -> Option<&'a mut NativeSymbol> {
    unsafe { (p as *mut NativeSymbol).as_mut() }
}

unsafe fn ref_op(p: *mut mxs_op_t) -> Option<&'static NativeOp> {
    unsafe { (p as *const NativeOp).as_ref() }
}

unsafe fn read_str(p: *const c_char) -> Result<String, String> {
    if p.is_null() {
        return Err("null string argument".to_string());
    }
    unsafe { CStr::from_ptr(p) }
        .to_str()
        .map(str::to_string)
        .map_err(|e| format!("invalid UTF-8 in argument: {e}"))
}

unsafe fn read_strs(p: *const *const c_char, n: usize) -> Result<Vec<String>, String> {
    if n == 0 {
        return Ok(Vec::new());
    }
    if p.is_null() {
        return Err("null string array".to_string());
    }
    let ptrs = unsafe { std::slice::from_raw_parts(p, n) };
    ptrs.iter().map(|&s| unsafe { read_str(s) }).collect()
}

fn to_cstring(s: String) -> Result<CString, String> {
    CString::new(s).map_err(|e| format!("interior NUL in string: {e}"))
}

// ── Error reporting ─────────────────────────────────────────────────────

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

fn fail(message: impl Into<String>) -> c_int {
    let message = CString::new(message.into().replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|e| *e.borrow_mut() = message);
    -1
}

fn status(result: Result<(), String>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(message) => fail(message),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn mxs_get_last_error() -> *const c_char {
    LAST_ERROR.with(|e| e.borrow().as_ptr())
}

// ── Registry ────────────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub unsafe extern "C" fn mxs_list_ops(
    out_size: *mut mx_uint,
    out_array: *mut *const *mut mxs_op_t,
) -> c_int {
    if out_size.is_null() || out_array.is_null() {
        return fail("mxs_list_ops: null output pointer");
    }
    unsafe {
        *out_size = OP_PTRS.0.len() as mx_uint;
        *out_array = OP_PTRS.0.as_ptr();
    }
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn mxs_op_get_info(
    op: *mut mxs_op_t,
    name: *mut *const c_char,
    description: *mut *const c_char,
    num_args: *mut mx_uint,
    arg_names: *mut *const *const c_char,
    arg_types: *mut *const *const c_char,
    arg_descs: *mut *const *const c_char,
    key_var_num_args: *mut *const c_char,
    return_type: *mut *const c_char,
) -> c_int {
    let Some(op) = (unsafe { ref_op(op) }) else {
        return fail("mxs_op_get_info: null operator handle");
    };
    unsafe {
        *name = op.name.as_ptr();
        *description = op.description.as_ptr();
        *num_args = op.arg_names.len() as mx_uint;
        *arg_names = op.name_ptrs.0.as_ptr();
        *arg_types = op.type_ptrs.0.as_ptr();
        *arg_descs = op.desc_ptrs.0.as_ptr();
        *key_var_num_args = op.key_var_num_args.as_ptr();
        *return_type = op.return_type.as_ptr();
    }
    0
}

// ── Symbol creation ─────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub unsafe extern "C" fn mxs_symbol_create_variable(
    name: *const c_char,
    out: *mut *mut mxs_symbol_t,
) -> c_int {
    let result = unsafe { read_str(name) }.and_then(to_cstring).map(|name| {
        box_symbol(NativeSymbol {
            op: None,
            name,
            params: Vec::new(),
            inputs: Vec::new(),
            composed: true,
        })
    });
    match result {
        Ok(sym) => {
            unsafe { *out = sym };
            0
        }
        Err(message) => fail(message),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn mxs_symbol_create_atomic(
    op: *mut mxs_op_t,
    num_param: mx_uint,
    keys: *const *const c_char,
    vals: *const *const c_char,
    out: *mut *mut mxs_symbol_t,
) -> c_int {
    let Some(op) = (unsafe { ref_op(op) }) else {
        return fail("mxs_symbol_create_atomic: null operator handle");
    };
    let n = num_param as usize;
    let params = match unsafe { (read_strs(keys, n), read_strs(vals, n)) } {
        (Ok(keys), Ok(vals)) => keys.into_iter().zip(vals).collect::<Vec<_>>(),
        (Err(e), _) | (_, Err(e)) => return fail(e),
    };

    for (arg, type_tag) in op.args() {
        if !NativeOp::is_node(type_tag)
            && type_tag.contains("required")
            && !params.iter().any(|(k, _)| k == arg)
        {
            return fail(format!(
                "{}: Required parameter {arg} of {type_tag} is not presented",
                op.name()
            ));
        }
    }

    let mut cparams = Vec::with_capacity(params.len());
    for (k, v) in params {
        match (to_cstring(k), to_cstring(v)) {
            (Ok(k), Ok(v)) => cparams.push((k, v)),
            (Err(e), _) | (_, Err(e)) => return fail(e),
        }
    }

    let sym = box_symbol(NativeSymbol {
        op: Some(op),
        name: CString::default(),
        params: cparams,
        inputs: Vec::new(),
        composed: false,
    });
    unsafe { *out = sym };
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn mxs_symbol_compose(
    sym: *mut mxs_symbol_t,
    name: *const c_char,
    num_args: mx_uint,
    keys: *const *const c_char,
    args: *const *mut mxs_symbol_t,
) -> c_int {
    let Some(target) = (unsafe { ref_symbol(sym) }) else {
        return fail("mxs_symbol_compose: null symbol handle");
    };
    let n = num_args as usize;
    let result = (|| {
        if target.composed {
            return Err("symbol is already composed".to_string());
        }
        let Some(op) = target.op else {
            return Err("cannot compose a variable".to_string());
        };
        let name = unsafe { read_str(name) }?;
        let input_keys = if keys.is_null() {
            None
        } else {
            Some(unsafe { read_strs(keys, n) }?)
        };
        let inputs: &[*mut mxs_symbol_t] = if n == 0 {
            &[]
        } else if args.is_null() {
            return Err("null input array".to_string());
        } else {
            unsafe { std::slice::from_raw_parts(args, n) }
        };

        if let Some(input_keys) = &input_keys
            && !op.has_variadic_input()
        {
            for key in input_keys {
                let declared = op
                    .args()
                    .any(|(arg, t)| arg == key && NativeOp::is_node(t));
                if !declared {
                    return Err(format!("{}: unknown input argument '{key}'", op.name()));
                }
            }
        }

        if let Some(key_var) = op.key_var()
            && let Some((_, val)) = target
                .params
                .iter()
                .find(|(k, _)| k.to_str() == Ok(key_var))
        {
            let expected: usize = val
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .ok_or_else(|| format!("{}: {key_var} must be an integer", op.name()))?;
            if expected != n {
                return Err(format!(
                    "{}: {key_var}={expected} but {n} inputs were given",
                    op.name()
                ));
            }
        }

        let mut input_names = Vec::with_capacity(n);
        for &input in inputs {
            let input = unsafe { ref_symbol(input) }.ok_or("null input symbol")?;
            input_names.push(input.name.to_string_lossy().into_owned());
        }

        target.name = to_cstring(name)?;
        target.inputs = input_names;
        target.composed = true;
        Ok(())
    })();
    status(result)
}

// ── Symbol queries ──────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub unsafe extern "C" fn mxs_symbol_get_name(
    sym: *mut mxs_symbol_t,
    out: *mut *const c_char,
) -> c_int {
    match unsafe { ref_symbol(sym) } {
        Some(s) => {
            unsafe { *out = s.name.as_ptr() };
            0
        }
        None => fail("mxs_symbol_get_name: null symbol handle"),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn mxs_symbol_get_attr(
    sym: *mut mxs_symbol_t,
    key: *const c_char,
    out: *mut *const c_char,
    success: *mut c_int,
) -> c_int {
    let Some(s) = (unsafe { ref_symbol(sym) }) else {
        return fail("mxs_symbol_get_attr: null symbol handle");
    };
    let key = match unsafe { read_str(key) } {
        Ok(key) => key,
        Err(e) => return fail(e),
    };
    match s.params.iter().find(|(k, _)| k.to_str() == Ok(key.as_str())) {
        Some((_, v)) => unsafe {
            *out = v.as_ptr();
            *success = 1;
        },
        None => unsafe { *success = 0 },
    }
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn mxs_symbol_num_inputs(sym: *mut mxs_symbol_t, out: *mut mx_uint) -> c_int {
    match unsafe { ref_symbol(sym) } {
        Some(s) => {
            unsafe { *out = s.inputs.len() as mx_uint };
            0
        }
        None => fail("mxs_symbol_num_inputs: null symbol handle"),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn mxs_symbol_free(sym: *mut mxs_symbol_t) -> c_int {
    if !sym.is_null() {
        drop(unsafe { Box::from_raw(sym as *mut NativeSymbol) });
    }
    0
}
