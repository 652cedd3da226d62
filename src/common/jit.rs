//! Execution of finalized machine code as callable functions.
//!
//! Code bytes are copied into executable pages obtained from a
//! [`jit_allocator2::JitAllocator`]; the allocator is owned by the
//! callable wrapper, so the pages live exactly as long as the function
//! that points into them.

use std::marker::PhantomData;

use jit_allocator2::JitAllocator;

/// A JIT-compiled function that can be called directly
///
/// This structure wraps executable machine code and provides type-safe
/// calling methods. While the type parameter `F` represents a Rust function
/// signature, the actual execution uses C ABI for stability.
pub struct CallableJitFunction<F> {
    _allocator: Box<JitAllocator>,
    exec_ptr: *const u8,
    _phantom: PhantomData<F>,
}

impl<F> CallableJitFunction<F> {
    /// Create a new callable JIT function from finalized code bytes
    pub fn new(code: &[u8]) -> Result<Self, JitError> {
        let mut allocator = JitAllocator::new(Default::default());
        let (exec_ptr, mut_ptr) = allocator
            .alloc(code.len())
            .map_err(JitError::AllocationFailed)?;

        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), mut_ptr, code.len());
        }

        Ok(CallableJitFunction {
            _allocator: allocator,
            exec_ptr,
            _phantom: PhantomData,
        })
    }
}

impl<R> CallableJitFunction<fn() -> R> {
    /// Call with no arguments - natural syntax: func.call()
    ///
    /// The wrapped code must follow the C ABI for a zero-argument function
    /// returning `R` and must be valid for the host architecture.
    pub fn call(&self) -> R {
        let func: extern "C" fn() -> R = unsafe { std::mem::transmute_copy(&self.exec_ptr) };
        func()
    }
}

/// Errors that can occur when materializing executable code
#[derive(Debug)]
pub enum JitError {
    AllocationFailed(jit_allocator2::Error),
}

impl std::fmt::Display for JitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JitError::AllocationFailed(e) => write!(f, "Failed to allocate JIT memory: {:?}", e),
        }
    }
}

impl std::error::Error for JitError {}
