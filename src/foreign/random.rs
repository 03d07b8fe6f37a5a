//! `Random` (`spec.md` §6). Backed by `Instance::foreign_data` holding a
//! `rand::rngs::StdRng`, seeded from entropy on construction.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::instance::Instance;
use crate::value::Value;
use crate::vm::Vm;

fn rng_instance(vm: &mut Vm, slot: usize) -> crate::error::VmResult<std::rc::Rc<Instance>> {
    match vm.get_slot(slot) {
        Value::Instance(i) if i.with_foreign::<StdRng, ()>(|_| ()).is_some() => Ok(i),
        other => Err(vm.runtime_error(format!("Expected a Random but got {}.", other.type_name()))),
    }
}

fn number_arg(vm: &mut Vm, slot: usize) -> crate::error::VmResult<f64> {
    match vm.get_slot(slot) {
        Value::Number(n) => Ok(n),
        other => Err(vm.runtime_error(format!("Expected a Number but got {}.", other.type_name()))),
    }
}

/// Seeds `instance`'s native RNG storage. Used both by the normal
/// `foreign_allocate` path (when a script writes `Random()`) and by
/// [`crate::corelib::bootstrap`] for the VM-wide default instance behind
/// `Maths.random()`, which is built without going through `callClass`.
pub(crate) fn seed_random(instance: &Instance) {
    instance.set_foreign::<StdRng>(StdRng::from_entropy());
}

pub fn register(vm: &mut Vm) {
    vm.register_foreign_class("Random", std::rc::Rc::new(|inst, _args| {
        seed_random(inst);
        Ok(())
    }));

    vm.register_foreign_method(
        "Random",
        "number()",
        false,
        Box::new(|vm, _argc| {
            let inst = rng_instance(vm, 0)?;
            let n = inst.with_foreign_mut::<StdRng, f64>(|rng| rng.gen::<f64>()).unwrap();
            Ok(Value::Number(n))
        }),
    );
    vm.register_foreign_method(
        "Random",
        "inRange(_,_)",
        false,
        Box::new(|vm, _argc| {
            let low = number_arg(vm, 1)?;
            let high = number_arg(vm, 2)?;
            if low >= high {
                return Err(vm.runtime_error("Random.inRange(_,_) requires low < high."));
            }
            let inst = rng_instance(vm, 0)?;
            let n = inst.with_foreign_mut::<StdRng, f64>(|rng| rng.gen_range(low..high)).unwrap();
            Ok(Value::Number(n))
        }),
    );
    vm.register_foreign_method(
        "Random",
        "lessThan(_)",
        false,
        Box::new(|vm, _argc| {
            let high = number_arg(vm, 1)?;
            if high <= 0.0 {
                return Err(vm.runtime_error("Random.lessThan(_) requires a positive argument."));
            }
            let inst = rng_instance(vm, 0)?;
            let n = inst.with_foreign_mut::<StdRng, f64>(|rng| rng.gen_range(0.0..high)).unwrap();
            Ok(Value::Number(n))
        }),
    );
}
