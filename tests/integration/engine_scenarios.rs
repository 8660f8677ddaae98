//! A small printer host patched by extensions, the way a plugin tree would
//! customize it at startup.

use kapuchin::host::{arg, target_arg};
use kapuchin::{
    call_original, find, get_original, resolve, revert, BuildOptions, Extension,
    ExtensionError, ExtensionManager, Host, LoadContext, PatchError, PatchRecord, Registry,
    TargetId, Value,
};

struct Printer {
    host: Host,
    fan: TargetId,
    patches: TargetId,
}

/// `klippy.extras.fan.Fan` with a `set_speed` method, and a lazy `patches`
/// package whose two children each declare one patch of `Fan`.
fn printer() -> Printer {
    let mut host = Host::new();
    let klippy = host.define_module("klippy", None, true).unwrap();
    let extras = host.define_module("extras", Some(klippy), true).unwrap();
    let fan_mod = host.define_module("fan", Some(extras), false).unwrap();
    let fan = host.define_type("Fan", Some(fan_mod), &[]).unwrap();

    let set_speed = host.define_function("set_speed", |host, args| {
        let this = target_arg(args, 0)?;
        let value = arg(args, 1, "value")?.clone();
        host.set_slot(this, "speed", value)?;
        Ok(Value::None)
    });
    host.set_slot(fan, "set_speed", set_speed.into()).unwrap();
    host.set_slot(fan, "max_power", Value::Float(1.0)).unwrap();

    let patches = host
        .define_lazy_module("patches", None, true, |_, _, _| Ok(()))
        .unwrap();

    // declared in reverse name order to show enumeration is by name
    host.define_lazy_module("scaling", Some(patches), false, move |host, registry, module| {
        let scaled = host.define_function("set_speed", move |host, args| {
            let this = target_arg(args, 0)?;
            let requested = arg(args, 1, "value")?.as_f64().unwrap_or_default();
            call_original(host, fan, "set_speed", this, &[Value::Float(requested * 0.5)])
        });
        host.set_slot(module, "set_speed", scaled.clone().into())?;
        registry.declare_patch(host, fan, None, &scaled.into())?;
        Ok(())
    })
    .unwrap();

    host.define_lazy_module("limits", Some(patches), false, move |host, registry, module| {
        let limits = host.define_type("Limits", Some(module), &[])?;
        registry.declare(
            &Value::Target(limits),
            [PatchRecord::new(fan, "max_power", 0.8)],
        )?;
        Ok(())
    })
    .unwrap();

    Printer { host, fan, patches }
}

struct Bootstrap {
    package: TargetId,
}

impl Extension for Bootstrap {
    fn name(&self) -> &str {
        "bootstrap"
    }

    fn load(&self, ctx: &mut LoadContext<'_>) -> Result<(), PatchError> {
        ctx.bootstrap(self.package)?;
        Ok(())
    }
}

struct Broken;

impl Extension for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn load(&self, ctx: &mut LoadContext<'_>) -> Result<(), PatchError> {
        let missing = ctx.host.lookup_path("klippy.extras.heater")?;
        ctx.apply(&PatchRecord::new(missing, "max_temp", 300i64))
    }
}

#[test]
fn test_find_orders_by_module_then_declaration() {
    let Printer {
        mut host,
        fan,
        patches,
    } = printer();
    let mut registry = Registry::new();

    let found = find(&mut host, &mut registry, &[patches], false).unwrap();
    let names: Vec<&str> = found.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["max_power", "set_speed"]);
    assert!(found.iter().all(|p| p.destination == fan));

    // discovery only declares; nothing is applied yet
    assert_eq!(host.slot(fan, "max_power").unwrap(), Some(&Value::Float(1.0)));
}

#[test]
fn test_extension_scales_speed_through_original() {
    let Printer {
        mut host,
        fan,
        patches,
    } = printer();
    let mut registry = Registry::new();
    let mut manager = ExtensionManager::new();
    let extensions: Vec<Box<dyn Extension>> = vec![Box::new(Bootstrap { package: patches })];

    manager.load_all(&mut host, &mut registry, &extensions).unwrap();
    assert_eq!(manager.applied().len(), 2);

    let instance = host.construct(fan, &[]).unwrap();
    host.call_method(instance, "set_speed", &[Value::Float(0.6)])
        .unwrap();
    assert_eq!(host.slot(instance, "speed").unwrap(), Some(&Value::Float(0.3)));
    assert_eq!(
        resolve(&host, fan, "max_power").unwrap(),
        Value::Float(0.8)
    );

    // a second load is a no-op
    manager.load_all(&mut host, &mut registry, &extensions).unwrap();
    assert_eq!(manager.status().applied_patches, 2);

    for record in manager.applied().iter().rev() {
        revert(&mut host, record).unwrap();
    }
    host.call_method(instance, "set_speed", &[Value::Float(0.6)])
        .unwrap();
    assert_eq!(host.slot(instance, "speed").unwrap(), Some(&Value::Float(0.6)));
    assert_eq!(
        resolve(&host, fan, "max_power").unwrap(),
        Value::Float(1.0)
    );
}

#[test]
fn test_failing_extension_stops_the_sequence() {
    let Printer {
        mut host,
        fan,
        patches,
    } = printer();
    let mut registry = Registry::new();
    let mut manager = ExtensionManager::new();
    let extensions: Vec<Box<dyn Extension>> = vec![
        Box::new(Bootstrap { package: patches }),
        Box::new(Broken),
        Box::new(Bootstrap { package: patches }),
    ];

    let err = manager
        .load_all(&mut host, &mut registry, &extensions)
        .unwrap_err();
    match err {
        ExtensionError::Load { name, source } => {
            assert_eq!(name, "broken");
            assert!(source.is_not_found());
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // the first extension's patches stay applied
    assert_eq!(manager.status().extensions, vec!["bootstrap".to_string()]);
    assert_eq!(
        get_original(&host, fan, "max_power", "default").unwrap(),
        Value::Float(1.0)
    );
}

#[test]
fn test_declare_patches_merges_nested_types() {
    let mut host = Host::new();
    let toolhead = host.define_type("ToolHead", None, &[]).unwrap();
    let kinematics = host.define_type("Kinematics", None, &[]).unwrap();
    host.set_slot(kinematics, "max_velocity", Value::Int(300)).unwrap();
    host.set_slot(kinematics, "max_accel", Value::Int(3000)).unwrap();
    host.set_slot(toolhead, "Kinematics", kinematics.into()).unwrap();

    let template = host.define_type("FastToolHead", None, &[]).unwrap();
    let fast_kinematics = host.define_type("FastKinematics", None, &[]).unwrap();
    host.set_slot(fast_kinematics, "max_accel", Value::Int(7000)).unwrap();
    host.set_slot(template, "Kinematics", fast_kinematics.into()).unwrap();
    host.set_slot(template, "_scratch", Value::Int(0)).unwrap();

    let mut registry = Registry::new();
    let records = registry
        .declare_patches(&host, toolhead, template, &BuildOptions::default())
        .unwrap();
    assert_eq!(records, vec![PatchRecord::new(kinematics, "max_accel", 7000i64)]);
    assert_eq!(
        registry.get(&Value::Target(template)).unwrap().patches,
        records
    );

    for record in &records {
        kapuchin::apply(&mut host, record).unwrap();
    }
    assert_eq!(host.slot(kinematics, "max_accel").unwrap(), Some(&Value::Int(7000)));
    assert_eq!(host.slot(kinematics, "max_velocity").unwrap(), Some(&Value::Int(300)));
}
