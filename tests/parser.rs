mod common;

use std::sync::{Arc, atomic::Ordering};

use regdev::{
    RegDevError, Status,
    parse::{Link, LinkError, LinkTable, Offset, OffsetSource, Packing, Parser},
    types::{DataType, RawBounds},
};

fn fixed(offset: &Offset) -> usize {
    match offset {
        Offset::Fixed(offset) => *offset,
        Offset::Linked(link) => panic!("expected a literal offset, got '{}'", link.name()),
    }
}

#[test]
fn parses_device_offset_and_type() {
    let (registry, _dev) = common::sim_registry("dev1", 0x100, &[]);
    let desc = Parser::new(&registry)
        .parse("ai:1", "dev1:51 T=INT8")
        .expect("parse dev1:51");
    assert_eq!(desc.device().name(), "dev1");
    assert_eq!(fixed(desc.offset()), 51);
    assert_eq!(desc.init_offset(), None, "init offset falls back to the main offset");
    assert_eq!(desc.resolve_offset(true).expect("startup offset"), 51);
    assert_eq!(desc.data_type(), DataType::Int8);
    assert_eq!(desc.dlen(), 1);
    assert_eq!(desc.bounds(), Some(RawBounds::new(-0x7f, 0x7f)));
}

#[test]
fn unknown_device_is_reported_with_the_client_name() {
    let (registry, _dev) = common::sim_registry("dev1", 0x100, &[]);
    let err = Parser::new(&registry)
        .parse("ai:2", "dev2/42")
        .expect_err("dev2 is not registered");
    assert!(
        matches!(&err, RegDevError::NoDevice { client, device } if client == "ai:2" && device == "dev2"),
        "got {err:?}"
    );
    assert_eq!(err.status(), Status::NoDevice);
    assert!(err.to_string().contains("ai:2"));
}

#[test]
fn offset_expressions_evaluate_left_to_right_with_products_first() {
    let (registry, _dev) = common::sim_registry("dev1", 0x100, &[]);
    let parser = Parser::new(&registry);
    let desc = parser.parse("rec", "dev1:1+6*10-20+10").expect("sum of products");
    assert_eq!(fixed(desc.offset()), 51);

    let desc = parser.parse("rec", "dev1:5*(2*(2+3))+1/2").expect("with init offset");
    assert_eq!(fixed(desc.offset()), 51);
    assert_eq!(desc.init_offset(), Some(2), "the /2 clause is the init offset");
    assert_eq!(desc.resolve_offset(true).expect("startup"), 2);
    assert_eq!(desc.resolve_offset(false).expect("running"), 51);
}

#[test]
fn default_bounds_follow_the_type() {
    let (registry, _dev) = common::sim_registry("dev1", 0x100, &[]);
    let parser = Parser::new(&registry);
    let bounds = |text: &str| parser.parse("rec", text).expect("parse").bounds();
    assert_eq!(bounds("dev1:0 T=UINT8"), Some(RawBounds::new(0, 0xff)));
    assert_eq!(bounds("dev1:0 T=BCD16"), Some(RawBounds::new(0, 9999)));
    assert_eq!(bounds("dev1:0 T=int16 L=-100"), Some(RawBounds::new(-100, 0x7fff)));
    assert_eq!(bounds("dev1:0 T=float64"), None);
}

#[test]
fn parameters_are_case_insensitive_and_order_free() {
    let (registry, _dev) = common::sim_registry("dev1", 0x100, &[]);
    let desc = Parser::new(&registry)
        .parse("rec", "dev1:0x20 u=100 b=3 t=ushort i=0xff")
        .expect("parse");
    assert_eq!(desc.data_type(), DataType::UInt16);
    assert_eq!(desc.bit(), Some(3));
    assert_eq!(desc.invert(), 0xff);
    assert_eq!(desc.update_period(), Some(std::time::Duration::from_millis(100)));
    assert_eq!(desc.packing(), Packing::None);
}

#[test]
fn setup_errors_are_bad_arguments() {
    let (registry, _dev) = common::sim_registry("dev1", 0x100, &[]);
    let parser = Parser::new(&registry);
    for text in [
        "dev1:(3",
        "dev1:3)",
        "dev1:0 T=int24",
        "dev1:0 T=int16 B=16",
        "dev1:0 T=uint8 H=256",
        "dev1:0 X=1",
        "dev1:0 T",
        "dev1:-4",
        ":4",
    ] {
        let err = parser.parse("rec", text).expect_err(text);
        assert_eq!(err.status(), Status::BadArgument, "{text}: {err}");
    }
}

struct Label;

impl OffsetSource for Label {
    fn current(&self) -> Result<i64, LinkError> {
        Err(LinkError::NotNumeric("label".into()))
    }

    fn is_numeric(&self) -> bool {
        false
    }
}

#[test]
fn reference_offsets_resolve_per_request() {
    let (registry, _dev) = common::sim_registry("dev1", 0x100, &[]);
    let mut links = LinkTable::new();
    let channel = links.publish("sel", 1);
    let parser = Parser::new(&registry).with_links(&links);

    let desc = parser.parse("rec", "dev1:'sel'*16+4").expect("quoted reference");
    assert_eq!(desc.resolve_offset(false).expect("first"), 20);
    channel.store(3, Ordering::Release);
    assert_eq!(desc.resolve_offset(false).expect("second"), 52, "re-read on every request");

    channel.store(-2, Ordering::Release);
    assert_eq!(
        desc.resolve_offset(false).expect("negative is not a parse error"),
        -28,
        "negative reference offsets are left to the range check"
    );

    let desc = parser.parse("rec", "dev1:( sel )").expect("parenthesised reference");
    assert!(matches!(desc.offset(), Offset::Linked(link) if link.name() == "sel"));
}

#[test]
fn reference_errors_distinguish_unknown_from_wrong_kind() {
    let (registry, _dev) = common::sim_registry("dev1", 0x100, &[]);
    let mut links = LinkTable::new();
    links.insert("label", Arc::new(Label));
    let parser = Parser::new(&registry).with_links(&links);

    let err = parser.parse("rec", "dev1:(missing)").expect_err("unknown");
    assert_eq!(err.status(), Status::BadArgument);
    let err = parser.parse("rec", "dev1:'label'").expect_err("not numeric");
    assert_eq!(err.status(), Status::BadArgumentType);
}

#[test]
fn only_instrument_links_are_accepted() {
    let (registry, _dev) = common::sim_registry("dev1", 0x100, &[]);
    let parser = Parser::new(&registry);
    let desc = parser
        .parse_link("rec", &Link::Instrument("dev1:8 T=uint32"))
        .expect("instrument link");
    assert_eq!(fixed(desc.offset()), 8);
    let err = parser
        .parse_link("rec", &Link::Database("other.VAL"))
        .expect_err("database link");
    assert_eq!(err.status(), Status::BadArgumentType);
}
