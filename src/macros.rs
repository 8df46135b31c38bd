#![allow(unused_macros)]

/// Helper macro for locking items
///
/// ```rust, ignore
///  let mut outputs = lock!(self.outputs);
///  outputs.push(output);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().expect("Failed to acquire lock")
    };
}
