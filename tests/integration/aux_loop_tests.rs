//! The auxiliary counter loop against a recording expander.

use std::cell::RefCell;
use std::rc::Rc;

use crate::mock_hw::{MockExpander, RecordingDelay, World};

use envnode::aux_loop::AuxLoop;

fn aux() -> (AuxLoop<MockExpander, RecordingDelay>, Rc<RefCell<World>>) {
    let world = Rc::new(RefCell::new(World::default()));
    let aux = AuxLoop::new(MockExpander(world.clone()), RecordingDelay(world.clone()), 200);
    (aux, world)
}

#[test]
fn writes_every_value_once_per_wrap() {
    let (mut aux, world) = aux();
    for _ in 0..512 {
        aux.tick();
    }
    let w = world.borrow();
    let writes = &w.bus_writes;
    assert_eq!(writes.len(), 512);
    assert_eq!(writes[0], 0);
    assert_eq!(writes[255], 255);
    assert_eq!(writes[256], 0);
    assert!(writes.iter().zip(writes.iter().skip(1)).all(|(a, b)| b.wrapping_sub(*a) == 1));
}

#[test]
fn recovers_after_bus_outage_without_resetting() {
    let (mut aux, world) = aux();
    aux.tick(); // 0
    world.borrow_mut().bus_fail = true;
    aux.tick(); // 1 lost
    aux.tick(); // 2 lost
    world.borrow_mut().bus_fail = false;
    aux.tick(); // 3
    assert_eq!(world.borrow().bus_writes, vec![0, 3]);
    assert_eq!(aux.write_failures(), 2);
}

#[test]
fn tick_does_not_sleep() {
    let (mut aux, world) = aux();
    aux.tick();
    assert!(world.borrow().sleeps_ms.is_empty());
}
