//! `Sprite`: a native type exposed to scripts.
//!
//! Scripts extend it with Lua-side methods; the host drives it through the
//! optional `animate` hook.

use luna_bridge::{ArgSpec, BridgeError, BridgeResult, Exposable, Methods, ObjectHandle, ScriptState};
use luna_engine::{Args, Runtime, Value};
use std::path::Path;

#[derive(Debug, Default)]
pub struct Sprite {
    name: String,
    frame: u32,
}

impl Exposable for Sprite {
    const CLASS: &'static str = "Sprite";

    fn create(_rt: &mut Runtime, args: &Args) -> BridgeResult<Self> {
        let name = match args.get(0) {
            Value::Nil => "sprite".into(),
            _ => args.check_string(0)?.to_string(),
        };
        Ok(Sprite { name, frame: 0 })
    }

    fn methods(methods: &mut Methods<Self>) {
        methods
            .add("say", |_sprite, rt, _args| {
                rt.write_output("Here I am, saying stuff.\n");
                Ok(Vec::new())
            })
            .add("name", |sprite, _rt, _args| Ok(vec![Value::from(sprite.name.as_str())]))
            .add("frame", |sprite, _rt, _args| Ok(vec![Value::from(sprite.frame as f64)]))
            .add("advance", |sprite, _rt, _args| {
                sprite.frame += 1;
                Ok(Vec::new())
            });
    }
}

/// Call the script-defined `animate` hook. A sprite without one is left
/// alone.
pub fn animate(state: &mut ScriptState, sprite: &ObjectHandle, dt: f64) -> BridgeResult<()> {
    let (rt, bridge) = state.parts();
    match bridge.call_method(rt, sprite, "animate", &[ArgSpec::Number(dt)], 0) {
        Ok(_) => Ok(()),
        Err(BridgeError::MethodNotFound(_)) => {
            log::debug!("sprite has no animate hook");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Expose `Sprite`, load its script-side methods from `script`, then create
/// one sprite and animate it `frames` times.
pub fn run_demo(state: &mut ScriptState, script: &Path, frames: u32) -> BridgeResult<ObjectHandle> {
    state.expose::<Sprite>()?;
    state.try_do_file(script)?;

    let (rt, bridge) = state.parts();
    let sprite = bridge.construct_native(rt, Sprite::default(), vec![Value::from("demo")])?;
    for _ in 0..frames {
        animate(state, &sprite, 1.0 / 60.0)?;
    }
    Ok(sprite)
}
