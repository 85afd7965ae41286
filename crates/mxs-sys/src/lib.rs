//! C ABI of the graph engine's operator registry and symbol creation.
//!
//! With the default `native` feature, all `mxs_*` functions are implemented
//! in pure Rust over a small built-in operator table. With the `cpp` feature,
//! they link against the external engine library built via cmake.
//!
//! Every function returning `c_int` returns `0` on success and `-1` on
//! failure; the message is then available from `mxs_get_last_error` on the
//! same thread.

#![allow(non_camel_case_types)]

#[cfg(feature = "cpp")]
use libc::{c_char, c_int};

pub type mx_uint = u32;

/// `true` when linked against the external C++ engine.
pub const CPP_ENABLED: bool = cfg!(feature = "cpp");

// ── Opaque handle types ─────────────────────────────────────────────────

/// Opaque handle to a registered operator (atomic symbol creator).
#[repr(C)]
pub struct mxs_op_t {
    _private: [u8; 0],
}

/// Opaque handle to a symbol.
#[repr(C)]
pub struct mxs_symbol_t {
    _private: [u8; 0],
}

// ── C++ FFI declarations (enabled with `cpp` feature) ───────────────────

#[cfg(feature = "cpp")]
unsafe extern "C" {
    pub fn mxs_get_last_error() -> *const c_char;
    pub fn mxs_list_ops(out_size: *mut mx_uint, out_array: *mut *const *mut mxs_op_t) -> c_int;
    pub fn mxs_op_get_info(
        op: *mut mxs_op_t,
        name: *mut *const c_char,
        description: *mut *const c_char,
        num_args: *mut mx_uint,
        arg_names: *mut *const *const c_char,
        arg_types: *mut *const *const c_char,
        arg_descs: *mut *const *const c_char,
        key_var_num_args: *mut *const c_char,
        return_type: *mut *const c_char,
    ) -> c_int;
    pub fn mxs_symbol_create_variable(name: *const c_char, out: *mut *mut mxs_symbol_t) -> c_int;
    pub fn mxs_symbol_create_atomic(
        op: *mut mxs_op_t,
        num_param: mx_uint,
        keys: *const *const c_char,
        vals: *const *const c_char,
        out: *mut *mut mxs_symbol_t,
    ) -> c_int;
    pub fn mxs_symbol_compose(
        sym: *mut mxs_symbol_t,
        name: *const c_char,
        num_args: mx_uint,
        keys: *const *const c_char,
        args: *const *mut mxs_symbol_t,
    ) -> c_int;
    pub fn mxs_symbol_get_name(sym: *mut mxs_symbol_t, out: *mut *const c_char) -> c_int;
    pub fn mxs_symbol_get_attr(
        sym: *mut mxs_symbol_t,
        key: *const c_char,
        out: *mut *const c_char,
        success: *mut c_int,
    ) -> c_int;
    pub fn mxs_symbol_num_inputs(sym: *mut mxs_symbol_t, out: *mut mx_uint) -> c_int;
    pub fn mxs_symbol_free(sym: *mut mxs_symbol_t) -> c_int;
}

// ── Pure-Rust native implementation (enabled with `native` feature) ─────

#[cfg(all(feature = "native", not(feature = "cpp")))]
mod native_impl;

#[cfg(all(feature = "native", not(feature = "cpp")))]
pub use native_impl::*;

#[cfg(all(test, feature = "native", not(feature = "cpp")))]
mod tests {
    use super::*;
    use std::ffi::{CStr, CString};
    use std::ptr;

    unsafe fn last_error() -> String {
        unsafe { CStr::from_ptr(mxs_get_last_error()) }
            .to_string_lossy()
            .into_owned()
    }

    unsafe fn op_named(name: &str) -> *mut mxs_op_t {
        unsafe {
            let mut n: mx_uint = 0;
            let mut ops: *const *mut mxs_op_t = ptr::null();
            assert_eq!(mxs_list_ops(&mut n, &mut ops), 0);
            let ops = std::slice::from_raw_parts(ops, n as usize);
            for &op in ops {
                let mut op_name = ptr::null();
                let mut desc = ptr::null();
                let mut num_args: mx_uint = 0;
                let (mut names, mut types, mut descs) = (ptr::null(), ptr::null(), ptr::null());
                let (mut key_var, mut ret) = (ptr::null(), ptr::null());
                let rc = mxs_op_get_info(
                    op,
                    &mut op_name,
                    &mut desc,
                    &mut num_args,
                    &mut names,
                    &mut types,
                    &mut descs,
                    &mut key_var,
                    &mut ret,
                );
                assert_eq!(rc, 0);
                if CStr::from_ptr(op_name).to_str().unwrap() == name {
                    return op;
                }
            }
            panic!("operator {name} not registered");
        }
    }

    unsafe fn variable(name: &str) -> *mut mxs_symbol_t {
        unsafe {
            let name = CString::new(name).unwrap();
            let mut out = ptr::null_mut();
            assert_eq!(mxs_symbol_create_variable(name.as_ptr(), &mut out), 0);
            out
        }
    }

    unsafe fn atomic(op: *mut mxs_op_t, params: &[(&str, &str)]) -> Result<*mut mxs_symbol_t, String> {
        unsafe {
            let keys: Vec<CString> = params.iter().map(|(k, _)| CString::new(*k).unwrap()).collect();
            let vals: Vec<CString> = params.iter().map(|(_, v)| CString::new(*v).unwrap()).collect();
            let key_ptrs: Vec<_> = keys.iter().map(|k| k.as_ptr()).collect();
            let val_ptrs: Vec<_> = vals.iter().map(|v| v.as_ptr()).collect();
            let mut out = ptr::null_mut();
            let rc = mxs_symbol_create_atomic(
                op,
                params.len() as mx_uint,
                key_ptrs.as_ptr(),
                val_ptrs.as_ptr(),
                &mut out,
            );
            if rc == 0 { Ok(out) } else { Err(last_error()) }
        }
    }

    unsafe fn name_of(sym: *mut mxs_symbol_t) -> String {
        unsafe {
            let mut out = ptr::null();
            assert_eq!(mxs_symbol_get_name(sym, &mut out), 0);
            CStr::from_ptr(out).to_string_lossy().into_owned()
        }
    }

    #[test]
    fn test_registry_lists_concat() {
        unsafe {
            let op = op_named("Concat");
            assert!(!op.is_null());
        }
    }

    #[test]
    fn test_concat_compose_positional() {
        unsafe {
            let x = variable("x");
            let y = variable("y");
            let sym = atomic(op_named("Concat"), &[("dim", "0"), ("num_args", "2")]).unwrap();
            let name = CString::new("concat0").unwrap();
            let args = [x, y];
            let rc = mxs_symbol_compose(sym, name.as_ptr(), 2, ptr::null(), args.as_ptr());
            assert_eq!(rc, 0, "{}", last_error());
            assert_eq!(name_of(sym), "concat0");

            let mut n: mx_uint = 0;
            assert_eq!(mxs_symbol_num_inputs(sym, &mut n), 0);
            assert_eq!(n, 2);

            let key = CString::new("dim").unwrap();
            let mut val = ptr::null();
            let mut success = 0;
            assert_eq!(mxs_symbol_get_attr(sym, key.as_ptr(), &mut val, &mut success), 0);
            assert_eq!(success, 1);
            assert_eq!(CStr::from_ptr(val).to_str().unwrap(), "0");

            for s in [sym, x, y] {
                assert_eq!(mxs_symbol_free(s), 0);
            }
        }
    }

    #[test]
    fn test_key_var_count_mismatch() {
        unsafe {
            let x = variable("x");
            let sym = atomic(op_named("Concat"), &[("num_args", "3")]).unwrap();
            let name = CString::new("c").unwrap();
            let rc = mxs_symbol_compose(sym, name.as_ptr(), 1, ptr::null(), [x].as_ptr());
            assert_eq!(rc, -1);
            assert!(last_error().contains("num_args"), "{}", last_error());
            mxs_symbol_free(sym);
            mxs_symbol_free(x);
        }
    }

    #[test]
    fn test_missing_required_parameter() {
        unsafe {
            let err = atomic(op_named("Cast"), &[]).unwrap_err();
            assert!(err.contains("Required parameter dtype"), "{err}");
        }
    }

    #[test]
    fn test_unknown_keyword_input() {
        unsafe {
            let x = variable("x");
            let sym = atomic(op_named("elemwise_add"), &[]).unwrap();
            let name = CString::new("add").unwrap();
            let key = CString::new("weight").unwrap();
            let rc = mxs_symbol_compose(sym, name.as_ptr(), 1, [key.as_ptr()].as_ptr(), [x].as_ptr());
            assert_eq!(rc, -1);
            assert!(last_error().contains("weight"));
            mxs_symbol_free(sym);
            mxs_symbol_free(x);
        }
    }
}
