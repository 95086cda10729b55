use epcdns::context::ResolverContext;

fn base_context() -> ResolverContext {
    ResolverContext {
        target: "pgw".to_string(),
        interface: "s5".to_string(),
        protocol: "gtp".to_string(),
        apn: String::new(),
        mnc: "001".to_string(),
        mcc: "100".to_string(),
        domain_suffix: "3gppnetwork.org".to_string(),
    }
}

#[test]
fn test_root_domain_without_apn() {
    let ctx = base_context();
    assert_eq!(
        ctx.build_domain_name().unwrap(),
        "epc.mnc001.mcc100.3gppnetwork.org"
    );
}

#[test]
fn test_apn_domain() {
    let mut ctx = base_context();
    ctx.apn = "mms".to_string();
    assert_eq!(
        ctx.build_domain_name().unwrap(),
        "mms.apn.epc.mnc001.mcc100.3gppnetwork.org"
    );
}

#[test]
fn test_field_capacities_enforced() {
    let mut ctx = base_context();
    ctx.target = "toolong!".to_string(); // 8 > 7
    assert!(ctx.validate().is_err());
    assert!(ctx.build_domain_name().is_err());

    let mut ctx = base_context();
    ctx.apn = "a".repeat(32); // 32 > 31
    assert!(ctx.validate().is_err());

    let mut ctx = base_context();
    ctx.domain_suffix = "s".repeat(64); // 64 > 63
    assert!(ctx.validate().is_err());
}

#[test]
fn test_maximal_fields_still_fit() {
    let ctx = ResolverContext {
        target: "a".repeat(7),
        interface: "b".repeat(7),
        protocol: "c".repeat(7),
        apn: "d".repeat(31),
        mnc: "1".repeat(7),
        mcc: "2".repeat(7),
        domain_suffix: "e".repeat(63),
    };
    let fqdn = ctx.build_domain_name().unwrap();
    assert!(fqdn.len() <= 127);
    assert!(fqdn.starts_with(&"d".repeat(31)));
}

#[test]
fn test_empty_protocol_is_allowed() {
    let mut ctx = base_context();
    ctx.protocol = String::new();
    assert!(ctx.validate().is_ok());
}
