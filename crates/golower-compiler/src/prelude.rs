//! The JavaScript runtime every linked program starts with.

/// Scheduler, channels, select, defer/panic/recover, slices, maps, strings
/// and numeric helpers referenced by generated code.
pub const PRELUDE: &str = include_str!("prelude.js");

/// Helpers the generated code may call. Kept in sync with `prelude.js` by
/// the test below.
pub const HELPERS: &[&str] = &[
    "$packages", "$natives", "$native", "$go", "$maybe", "$runToCompletion", "$suspend", "$sleep", "$gosched", "$callMain", "$Chan",
    "$send", "$recv", "$close", "$select", "$selectNow", "$Frame", "$recover", "$panic",
    "$Panic", "$RuntimeError", "$defineType", "$ptrType", "$iface", "$error", "$assertType",
    "$is", "$typeOf", "$equal", "$methodVal", "$Ptr", "$newPtr", "$fieldPtr", "$elemPtr",
    "$arrayElemPtr", "$deref", "$store", "$assignStruct", "$copyArray", "$makeArray", "$keyed",
    "$div", "$rem", "$shiftLeft32", "$shiftRightInt32", "$shiftRightUint32", "$shiftLeft64",
    "$shiftRight64", "$truncate", "$float32bits", "$float32frombits", "$float64bits",
    "$float64frombits", "$min", "$max", "$stringLen", "$byteAt", "$substring", "$stringRange",
    "$runeToString", "$stringToBytes", "$bytesToString", "$stringToRunes", "$runesToString",
    "$Slice", "$sliceOf", "$makeSlice", "$index", "$setIndex", "$indexArray", "$setIndexArray",
    "$len", "$cap", "$append", "$appendSlice", "$subslice", "$sliceArray", "$copy",
    "$clearSlice", "$GoMap", "$makeMap", "$mapGet", "$mapLookup", "$mapSet", "$mapDelete",
    "$mapEntries", "$mapClear", "$print", "$println", "$formatFloat", "$exportVar", "$Bool",
    "$Int", "$Int8", "$Int16", "$Int32", "$Int64", "$Uint", "$Uint8", "$Uint16", "$Uint32",
    "$Uint64", "$Uintptr", "$Float32", "$Float64", "$String", "$UnsafePointer",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_defines_every_helper() {
        for helper in HELPERS {
            let defined = [
                format!("var {helper} ="),
                format!("class {helper} "),
                format!("function* {helper}("),
                format!("function {helper}("),
            ]
            .iter()
            .any(|decl| PRELUDE.contains(decl.as_str()));
            assert!(defined, "{helper} is not defined by the prelude");
        }
    }

    #[test]
    fn test_prelude_is_strict() {
        assert!(PRELUDE.starts_with("\"use strict\";"));
    }
}
