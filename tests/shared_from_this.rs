#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use cbrc::{DanglingWeak, Shared, SharedFromThis, Weak, WeakThis};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Clone)]
struct Node {
    this: WeakThis<Node>,
    children: RefCell<Vec<Shared<Node>>>,
    parent: RefCell<Weak<Node>>,
    dropped: Rc<Cell<usize>>,
}

impl SharedFromThis for Node {
    fn weak_this(&self) -> &WeakThis<Self> {
        &self.this
    }
}

impl Node {
    fn new(dropped: &Rc<Cell<usize>>) -> Node {
        Node {
            this: WeakThis::new(),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            dropped: dropped.clone(),
        }
    }

    fn adopt(&self, child: Shared<Node>) {
        *child.parent.borrow_mut() = self.weak_from_this();
        self.children.borrow_mut().push(child);
    }

    fn count_from_inside(&self) -> usize {
        let this = self.shared_from_this().unwrap();
        Shared::strong_count(&this)
    }
}

impl Drop for Node {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn drop(&mut self) {
        self.dropped.set(self.dropped.get() + 1);
        // All strong pointers are gone by now
        assert!(matches!(self.shared_from_this(), Err(DanglingWeak)));
    }
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn shared_from_this_adds_one_strong_count() {
    let dropped = Rc::new(Cell::new(0));
    let node = Shared::new_linked(Node::new(&dropped));
    let other = node.clone();
    assert_eq!(Shared::strong_count(&node), 2);

    assert_eq!(node.count_from_inside(), 3);
    assert_eq!(Shared::strong_count(&node), 2);

    drop(other);
    drop(node);
    assert_eq!(dropped.get(), 1);
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn weak_from_this_never_fails() {
    let dropped = Rc::new(Cell::new(0));

    let unlinked = Node::new(&dropped);
    assert!(unlinked.weak_from_this().expired());
    assert!(matches!(unlinked.shared_from_this(), Err(DanglingWeak)));

    let linked = Shared::from_box_linked(Box::new(unlinked));
    let weak = linked.weak_from_this();
    assert!(Shared::ptr_eq(&weak.lock(), &linked));

    drop(linked);
    assert!(weak.expired());
    assert_eq!(dropped.get(), 1);
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn tree_with_parent_back_references() {
    let dropped = Rc::new(Cell::new(0));
    let root = Shared::new_linked(Node::new(&dropped));
    let child = Shared::new_linked(Node::new(&dropped));
    root.adopt(child.clone());

    let parent = child.parent.borrow().lock();
    assert!(Shared::ptr_eq(&parent, &root));
    drop(parent);

    drop(root);
    // The child's parent pointer is weak, so the root is gone
    assert_eq!(dropped.get(), 1);
    assert!(child.parent.borrow().expired());

    drop(child);
    assert_eq!(dropped.get(), 2);
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn cloned_payload_is_not_linked() {
    let dropped = Rc::new(Cell::new(0));
    let node = Shared::new_linked(Node::new(&dropped));

    let copy: Node = (*node).clone();
    assert!(copy.weak_from_this().expired());

    let copy = Shared::new_linked(copy);
    assert!(!Shared::owner_eq(&copy.shared_from_this().unwrap(), &node));
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn raw_pointers_link_only_through_linking_constructor() {
    let dropped = Rc::new(Cell::new(0));

    let raw = Box::into_raw(Box::new(Node::new(&dropped)));
    // SAFETY: `raw` comes from `Box::into_raw` and nothing else owns it
    let linked = unsafe { Shared::from_raw_linked(raw) };
    assert_eq!(linked.count_from_inside(), 2);
    assert_eq!(Shared::weak_count(&linked), 1);

    let raw = Box::into_raw(Box::new(Node::new(&dropped)));
    // SAFETY: as above
    let unlinked = unsafe { Shared::from_raw(raw) };
    assert!(matches!(unlinked.shared_from_this(), Err(DanglingWeak)));

    let boxed: Shared<Node> = Box::new(Node::new(&dropped)).into();
    assert!(matches!(boxed.shared_from_this(), Err(DanglingWeak)));

    drop((linked, unlinked, boxed));
    assert_eq!(dropped.get(), 3);
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn replacing_a_linked_payload() {
    let dropped = Rc::new(Cell::new(0));
    let mut node = Shared::new_linked(Node::new(&dropped));
    let old = node.weak_from_this();

    Shared::reset_with(&mut node, Box::new(Node::new(&dropped)));
    assert_eq!(dropped.get(), 1);
    assert!(old.expired());
    assert!(matches!(node.shared_from_this(), Err(DanglingWeak)));

    node = Shared::from_box_linked(Box::new(Node::new(&dropped)));
    assert_eq!(dropped.get(), 2);
    assert_eq!(node.count_from_inside(), 2);
}
