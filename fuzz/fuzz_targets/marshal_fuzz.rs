//! Marshal fuzz target: feed arbitrary JSON through a self-referencing mapper.
//! Marshal and serialize must not panic; they return Ok or a MapperError.
//! Build with: cargo fuzz run marshal_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use fieldmap::{Field, Limits, Mapper, MapperSchema, NestedOpts};
#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let json: serde_json::Value = match serde_json::from_slice(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    let schema = MapperSchema::builder("FuzzNode")
        .object_type("Node")
        .field("label", Field::string().choices(["a", "b", "c"]))
        .field("weight", Field::integer().default(0))
        .field("flag", Field::boolean().allow_none(false))
        .field("next", Field::nested(NestedOpts::new("FuzzNode").allow_create()))
        .field(
            "children",
            match Field::collection(Field::nested(NestedOpts::new("FuzzNode").allow_create())) {
                Ok(f) => f,
                Err(_) => return,
            },
        )
        .build();
    let limits = Limits { max_depth: 16 };
    let mut mapper = Mapper::new(&schema).data(&json).limits(limits);
    if let Ok(obj) = mapper.marshal() {
        let _ = Mapper::new(&schema).obj(obj).limits(limits).serialize();
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run marshal_fuzz");
}
