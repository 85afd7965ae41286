//! Engine that delegates operator introspection and symbol creation to the
//! mxs-sys C ABI.

use mxs_core::engine::{CreateRequest, Engine, OpHandle};
use mxs_core::signature::{OperatorMetadata, RawArgument};
use mxs_core::{BindingConfig, MxsError, Result, Symbol, SymbolHandle};
use mxs_sys as sys;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};

/// Engine backed by the `mxs_*` C ABI.
///
/// Symbols created through this engine stay alive until they are released
/// with [`FfiEngine::free_symbol`] or the engine is dropped.
pub struct FfiEngine {
    ops: Vec<NonNull<sys::mxs_op_t>>,
    arena: Mutex<Arena>,
    next: AtomicU64,
}

type Arena = HashMap<SymbolHandle, NonNull<sys::mxs_symbol_t>>;

// SAFETY: operator handles point into the engine's immutable registry.
// Symbol pointers are only dereferenced while the arena lock is held, and
// `free_symbol` takes the same lock, so a symbol cannot be freed while an
// FFI call is reading it.
unsafe impl Send for FfiEngine {}
unsafe impl Sync for FfiEngine {}

struct OpInfo {
    name: String,
    description: String,
    args: Vec<RawArgument>,
    key_var_num_args: String,
    return_type: String,
}

fn last_error() -> String {
    let p = unsafe { sys::mxs_get_last_error() };
    if p.is_null() {
        return "unknown engine error".to_string();
    }
    unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned()
}

fn check_call(rc: libc::c_int) -> Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(MxsError::Engine(last_error()))
    }
}

unsafe fn read_cstr(p: *const libc::c_char) -> String {
    if p.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned()
    }
}

unsafe fn read_cstrs(p: *const *const libc::c_char, n: usize) -> Vec<String> {
    if p.is_null() || n == 0 {
        return Vec::new();
    }
    let ptrs = unsafe { std::slice::from_raw_parts(p, n) };
    ptrs.iter().map(|&s| unsafe { read_cstr(s) }).collect()
}

/// Pointer for `sym`. Only valid while the guard behind `arena` is held.
fn lookup(arena: &Arena, sym: &Symbol) -> Result<NonNull<sys::mxs_symbol_t>> {
    arena.get(&sym.handle()).copied().ok_or_else(|| {
        MxsError::InvalidArgument(format!(
            "symbol `{}` does not belong to this engine",
            sym.name()
        ))
    })
}

fn cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| MxsError::InvalidArgument(format!("string contains NUL: {s:?}")))
}

impl FfiEngine {
    /// Open the engine's operator registry.
    pub fn new() -> Result<Self> {
        let mut n: sys::mx_uint = 0;
        let mut array: *const *mut sys::mxs_op_t = ptr::null();
        check_call(unsafe { sys::mxs_list_ops(&mut n, &mut array) })?;
        let raw = if n == 0 {
            &[][..]
        } else if array.is_null() {
            return Err(MxsError::NullPtr);
        } else {
            unsafe { std::slice::from_raw_parts(array, n as usize) }
        };
        let ops = raw
            .iter()
            .map(|&op| NonNull::new(op).ok_or(MxsError::NullPtr))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            operators = ops.len(),
            backend = Self::backend_name(),
            "opened engine registry"
        );
        Ok(Self {
            ops,
            arena: Mutex::new(HashMap::new()),
            next: AtomicU64::new(1),
        })
    }

    /// Open the registry honoring `MXS_ENFORCE_CPP`.
    pub fn from_config(config: &BindingConfig) -> Result<Self> {
        if config.enforce_cpp && !sys::CPP_ENABLED {
            return Err(MxsError::ImportConfiguration(
                "MXS_ENFORCE_CPP is set but mxs-sys was built without the `cpp` feature".into(),
            ));
        }
        Self::new()
    }

    pub fn backend_name() -> &'static str {
        if sys::CPP_ENABLED { "cpp" } else { "native" }
    }

    /// Create a named graph variable.
    pub fn variable(&self, name: &str) -> Result<Symbol> {
        let cname = cstring(name)?;
        let mut out = ptr::null_mut();
        check_call(unsafe { sys::mxs_symbol_create_variable(cname.as_ptr(), &mut out) })?;
        let sym = NonNull::new(out).ok_or(MxsError::NullPtr)?;
        self.track(sym)
    }

    /// Scalar parameter or attribute stored on a symbol.
    pub fn attr(&self, sym: &Symbol, key: &str) -> Result<Option<String>> {
        let ckey = cstring(key)?;
        let arena = self.arena.lock();
        let ptr = lookup(&arena, sym)?;
        let mut out = ptr::null();
        let mut success = 0;
        check_call(unsafe {
            sys::mxs_symbol_get_attr(ptr.as_ptr(), ckey.as_ptr(), &mut out, &mut success)
        })?;
        Ok((success != 0).then(|| unsafe { read_cstr(out) }))
    }

    /// Number of node inputs composed into a symbol.
    pub fn num_inputs(&self, sym: &Symbol) -> Result<usize> {
        let arena = self.arena.lock();
        let ptr = lookup(&arena, sym)?;
        let mut n: sys::mx_uint = 0;
        check_call(unsafe { sys::mxs_symbol_num_inputs(ptr.as_ptr(), &mut n) })?;
        Ok(n as usize)
    }

    /// Release a symbol early. Unknown symbols are ignored.
    pub fn free_symbol(&self, sym: &Symbol) {
        if let Some(ptr) = self.arena.lock().remove(&sym.handle()) {
            unsafe { sys::mxs_symbol_free(ptr.as_ptr()) };
        }
    }

    fn track(&self, ptr: NonNull<sys::mxs_symbol_t>) -> Result<Symbol> {
        let mut name = ptr::null();
        if let Err(err) = check_call(unsafe { sys::mxs_symbol_get_name(ptr.as_ptr(), &mut name) }) {
            unsafe { sys::mxs_symbol_free(ptr.as_ptr()) };
            return Err(err);
        }
        let name = unsafe { read_cstr(name) };
        let handle = SymbolHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.arena.lock().insert(handle, ptr);
        Ok(Symbol::new(handle, name))
    }

    fn op(&self, handle: OpHandle) -> Result<NonNull<sys::mxs_op_t>> {
        usize::try_from(handle.0)
            .ok()
            .and_then(|i| self.ops.get(i))
            .copied()
            .ok_or_else(|| MxsError::InvalidArgument(format!("unknown operator handle {}", handle.0)))
    }

    fn op_info(&self, op: NonNull<sys::mxs_op_t>) -> Result<OpInfo> {
        let mut name = ptr::null();
        let mut description = ptr::null();
        let mut num_args: sys::mx_uint = 0;
        let mut arg_names = ptr::null();
        let mut arg_types = ptr::null();
        let mut arg_descs = ptr::null();
        let mut key_var_num_args = ptr::null();
        let mut return_type = ptr::null();
        check_call(unsafe {
            sys::mxs_op_get_info(
                op.as_ptr(),
                &mut name,
                &mut description,
                &mut num_args,
                &mut arg_names,
                &mut arg_types,
                &mut arg_descs,
                &mut key_var_num_args,
                &mut return_type,
            )
        })?;
        let n = num_args as usize;
        let (names, types, descs) = unsafe {
            (
                read_cstrs(arg_names, n),
                read_cstrs(arg_types, n),
                read_cstrs(arg_descs, n),
            )
        };
        if names.len() != n || types.len() != n {
            return Err(MxsError::NullPtr);
        }
        let args = names
            .into_iter()
            .zip(types)
            .enumerate()
            .map(|(i, (name, type_tag))| RawArgument {
                name,
                type_tag,
                description: descs.get(i).cloned().unwrap_or_default(),
            })
            .collect();
        Ok(OpInfo {
            name: unsafe { read_cstr(name) },
            description: unsafe { read_cstr(description) },
            args,
            key_var_num_args: unsafe { read_cstr(key_var_num_args) },
            return_type: unsafe { read_cstr(return_type) },
        })
    }
}

impl Drop for FfiEngine {
    fn drop(&mut self) {
        let arena = std::mem::take(&mut *self.arena.lock());
        for (_h, sym) in arena {
            unsafe { sys::mxs_symbol_free(sym.as_ptr()) };
        }
    }
}

impl Engine for FfiEngine {
    fn list_ops(&self) -> Result<Vec<(OpHandle, String)>> {
        self.ops
            .iter()
            .enumerate()
            .map(|(i, &op)| Ok((OpHandle(i as u64), self.op_info(op)?.name)))
            .collect()
    }

    fn op_metadata(&self, handle: OpHandle) -> Result<OperatorMetadata> {
        let info = self.op_info(self.op(handle)?)?;
        Ok(OperatorMetadata {
            op_name: info.name,
            handle,
            description: info.description,
            args: info.args,
            key_var_num_args: info.key_var_num_args,
            return_type: info.return_type,
        })
    }

    fn create_symbol(&self, request: CreateRequest) -> Result<Symbol> {
        let positional = request.positional.unwrap_or_default();
        if !positional.is_empty() && !request.keyword.is_empty() {
            return Err(MxsError::InvalidArgument(
                "operators with variable length input can only accept input Symbols \
                 either as positional or keyword arguments, not both"
                    .into(),
            ));
        }
        let op = self.op(request.handle)?;

        // Held until compose has read the inputs.
        let arena = self.arena.lock();
        let (input_keys, inputs) = if positional.is_empty() {
            let mut keys = Vec::with_capacity(request.keyword.len());
            let mut inputs = Vec::with_capacity(request.keyword.len());
            for (key, sym) in &request.keyword {
                keys.push(cstring(key)?);
                inputs.push(lookup(&arena, sym)?.as_ptr());
            }
            (Some(keys), inputs)
        } else {
            let inputs = positional
                .iter()
                .map(|sym| lookup(&arena, sym).map(NonNull::as_ptr))
                .collect::<Result<Vec<_>>>()?;
            (None, inputs)
        };

        let keys = request
            .keys
            .iter()
            .map(|k| cstring(k))
            .collect::<Result<Vec<_>>>()?;
        let vals = request
            .vals
            .iter()
            .map(|v| cstring(v))
            .collect::<Result<Vec<_>>>()?;
        let key_ptrs: Vec<_> = keys.iter().map(|k| k.as_ptr()).collect();
        let val_ptrs: Vec<_> = vals.iter().map(|v| v.as_ptr()).collect();
        let name = cstring(&request.name)?;

        let mut out = ptr::null_mut();
        check_call(unsafe {
            sys::mxs_symbol_create_atomic(
                op.as_ptr(),
                key_ptrs.len() as sys::mx_uint,
                key_ptrs.as_ptr(),
                val_ptrs.as_ptr(),
                &mut out,
            )
        })?;
        let sym = NonNull::new(out).ok_or(MxsError::NullPtr)?;

        let input_key_ptrs: Option<Vec<_>> = input_keys
            .as_ref()
            .map(|keys| keys.iter().map(|k| k.as_ptr()).collect());
        let rc = unsafe {
            sys::mxs_symbol_compose(
                sym.as_ptr(),
                name.as_ptr(),
                inputs.len() as sys::mx_uint,
                input_key_ptrs.as_ref().map_or(ptr::null(), |k| k.as_ptr()),
                inputs.as_ptr(),
            )
        };
        drop(arena);
        if let Err(err) = check_call(rc) {
            unsafe { sys::mxs_symbol_free(sym.as_ptr()) };
            return Err(err);
        }
        self.track(sym)
    }
}
