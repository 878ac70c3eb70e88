//! Internal helpers shared by the codecs and the connection.

/// Returns `Err($error)` from the enclosing function unless `$predicate` holds.
///
/// ```ignore
/// ensure!(required_insert_count == 0, DecodeError::dynamic_table("required insert count"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr $(,)?) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
