//! `System` (`spec.md` §6): the embedding host's clock and print sink.
//! Declared `foreign class` like every core class, but never constructed,
//! so it has no `foreign_allocate` registered here.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::value::Value;
use crate::vm::Vm;

pub fn register(vm: &mut Vm) {
    vm.register_foreign_method(
        "System",
        "clock()",
        true,
        Box::new(|vm, _argc| {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|e| vm.runtime_error(format!("System clock is before the Unix epoch: {e}")))?
                .as_secs_f64();
            Ok(Value::Number(secs))
        }),
    );
    vm.register_foreign_method(
        "System",
        "print(_)",
        true,
        Box::new(|vm, _argc| {
            let arg = vm.get_slot(1);
            let text = vm.stringify(&arg)?;
            vm.host_mut().print(&text);
            Ok(vm.nothing())
        }),
    );
}
