use classmaker::backend::classfile::access_flags::{ACC_FINAL, ACC_STATIC, ACC_SUPER, ACC_SYNTHETIC};
use classmaker::backend::classfile::major_versions;
use classmaker::{
    AtomicAccess, AtomicOp, ClassMaker, Config, Constant, ContainerKind, DirectoryOutput, Expr, FieldDef, MemoryOrder,
    MemoryOutput, MethodDef, MethodRef, Modifiers, Type,
};

mod common;
use common::{init_logging, parse_class};

fn finish(maker: &mut ClassMaker) -> MemoryOutput {
    let mut out = MemoryOutput::new();
    maker.finish_to(&mut out).expect("class should assemble");
    out
}

fn config(target: u16) -> Config {
    Config { target_version: target, ..Config::default() }
}

#[test]
fn test_simple_class_layout() {
    init_logging();
    let mut maker = ClassMaker::new("demo/Point");
    let x = maker.add_field(FieldDef::new("x", Type::int()).modifiers(Modifiers::PRIVATE)).unwrap();
    maker
        .constructor(MethodDef::constructor().modifiers(Modifiers::PUBLIC).param("x", Type::int()), |code, blk| {
            let this = code.this(blk)?.get();
            let value = code.param(blk, 0)?.get();
            code.put_field(blk, Some(this), &x, value)
        })
        .unwrap();
    maker
        .method(MethodDef::new("getX", Type::int()).modifiers(Modifiers::PUBLIC), |code, blk| {
            let this = code.this(blk)?.get();
            code.return_value(blk, Expr::get_field(this, &x)?)
        })
        .unwrap();

    let out = finish(&mut maker);
    assert_eq!(out.names(), &["demo.Point".to_string()]);
    let class = parse_class(out.get("demo.Point").unwrap());
    assert_eq!(class.major, major_versions::JAVA_11);
    assert_eq!(class.name, "demo/Point");
    assert_eq!(class.super_name.as_deref(), Some("java/lang/Object"));
    assert_ne!(class.access & ACC_SUPER, 0);
    assert_eq!(class.field("x").unwrap().descriptor, "I");

    let ctor = class.method("<init>").unwrap();
    assert_eq!(ctor.descriptor, "(I)V");
    // aload_0, invokespecial Object.<init>, aload_0, iload_1, putfield, return
    let code = ctor.code().unwrap();
    assert_eq!(code.len(), 10);
    assert_eq!([code[0], code[1], code[4], code[5], code[6], code[9]], [0x2a, 0xb7, 0x2a, 0x1b, 0xb5, 0xb1]);
    let get = class.method("getX").unwrap();
    assert_eq!(get.descriptor, "()I");
    assert!(get.code_attributes(&class.cp).contains(&"LocalVariableTable".to_string()));
}

#[test]
fn test_branching_method_gets_stack_map() {
    init_logging();
    let mut maker = ClassMaker::new("demo/Branch");
    maker
        .method(
            MethodDef::new("sign", Type::int()).modifiers(Modifiers::PUBLIC | Modifiers::STATIC).param("v", Type::int()),
            |code, blk| {
                let v = code.param(blk, 0)?.get();
                code.if_(blk, Expr::lt(v.clone(), Expr::int(0))?, |code, then| code.return_value(then, Expr::int(-1)))?;
                code.if_(blk, Expr::gt(v, Expr::int(0))?, |code, then| code.return_value(then, Expr::int(1)))?;
                code.return_value(blk, Expr::int(0))
            },
        )
        .unwrap();
    let out = finish(&mut maker);
    let class = parse_class(out.get("demo.Branch").unwrap());
    let sign = class.method("sign").unwrap();
    assert!(sign.code_attributes(&class.cp).contains(&"StackMapTable".to_string()));
    // iload_0 ifge
    assert_eq!(&sign.code().unwrap()[..2], &[0x1a, 0x9c]);
}

#[test]
fn test_frames_can_be_disabled() {
    init_logging();
    let cfg = Config { emit_frames: false, debug: false, ..Config::default() };
    let mut maker = ClassMaker::with_config("demo/NoFrames", ContainerKind::Class, cfg);
    maker
        .method(
            MethodDef::new("abs", Type::int()).modifiers(Modifiers::STATIC).param("v", Type::int()),
            |code, blk| {
                let v = code.param(blk, 0)?.get();
                let neg = Expr::neg(v.clone())?;
                let result = code.conditional(Expr::lt(v.clone(), Expr::int(0))?, neg, v, &Type::int())?;
                code.return_value(blk, result)
            },
        )
        .unwrap();
    let out = finish(&mut maker);
    let class = parse_class(out.get("demo.NoFrames").unwrap());
    let attrs = class.method("abs").unwrap().code_attributes(&class.cp);
    assert!(!attrs.contains(&"StackMapTable".to_string()));
    assert!(!attrs.contains(&"LocalVariableTable".to_string()));
}

#[test]
fn test_static_constant_uses_constant_value_attribute() {
    init_logging();
    let mut maker = ClassMaker::new("demo/Limits");
    maker
        .add_field(
            FieldDef::new("MAX", Type::int())
                .modifiers(Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::FINAL)
                .constant(Constant::Int(100)),
        )
        .unwrap();
    maker
        .add_field(FieldDef::new("NAME", Type::string()).modifiers(Modifiers::STATIC).init(Expr::string("limits")))
        .unwrap();
    let out = finish(&mut maker);
    let class = parse_class(out.get("demo.Limits").unwrap());
    assert!(class.field("MAX").unwrap().attribute("ConstantValue").is_some());
    assert!(class.field("NAME").unwrap().attribute("ConstantValue").is_none());
    let clinit = class.method("<clinit>").expect("NAME is set in <clinit>");
    // ldc, putstatic, return
    assert_eq!(clinit.code().unwrap()[0], 0x12);
    assert_eq!(*clinit.code().unwrap().last().unwrap(), 0xb1);
}

#[test]
fn test_large_collection_constant_uses_resource_blob() {
    init_logging();
    let mut maker = ClassMaker::new("demo/Table");
    let items: Vec<Constant> = (0..40).map(Constant::Int).collect();
    maker
        .method(MethodDef::new("values", Type::class("java/util/List")).modifiers(Modifiers::STATIC), |code, blk| {
            code.return_value(blk, Expr::constant(Constant::List(items))?)
        })
        .unwrap();
    let out = finish(&mut maker);
    let class = parse_class(out.get("demo.Table").unwrap());
    let field = class.field("$rc$0").expect("resource field");
    assert_eq!(field.descriptor, "Ljava/util/List;");
    assert_eq!(field.access, ACC_STATIC | ACC_FINAL | ACC_SYNTHETIC);
    assert!(class.method("$decodeConstants").is_some());
    assert!(class.method("<clinit>").is_some());
    // getstatic $rc$0; areturn
    assert_eq!(class.method("values").unwrap().code().unwrap()[0], 0xb2);
}

#[test]
fn test_small_collection_constant_is_inline() {
    init_logging();
    let mut maker = ClassMaker::new("demo/Small");
    maker
        .method(MethodDef::new("values", Type::class("java/util/Set")).modifiers(Modifiers::STATIC), |code, blk| {
            let set = Constant::Set(vec![Constant::String("a".into()), Constant::String("b".into())]);
            code.return_value(blk, Expr::constant(set)?)
        })
        .unwrap();
    let out = finish(&mut maker);
    let class = parse_class(out.get("demo.Small").unwrap());
    assert!(class.fields.is_empty());
    assert!(class.method("<clinit>").is_none());
    assert!(class.has_utf8("(Ljava/lang/Object;Ljava/lang/Object;)Ljava/util/Set;"));
}

#[test]
fn test_atomic_field_access_adds_var_handle() {
    init_logging();
    let mut maker = ClassMaker::new("demo/Counter");
    let count = maker.add_field(FieldDef::new("count", Type::int()).modifiers(Modifiers::VOLATILE)).unwrap();
    maker.default_constructor(Modifiers::PUBLIC).unwrap();
    maker
        .method(MethodDef::new("next", Type::int()).modifiers(Modifiers::PUBLIC), |code, blk| {
            let this = code.this(blk)?.get();
            let access = AtomicAccess::field(Some(this), &count)?;
            let add = Expr::atomic(code.registry(), AtomicOp::GetAndAdd, access, MemoryOrder::Volatile, vec![Expr::int(1)])?;
            code.return_value(blk, add)
        })
        .unwrap();
    let out = finish(&mut maker);
    let class = parse_class(out.get("demo.Counter").unwrap());
    let handle = class.field("$vh$0").expect("VarHandle field");
    assert_eq!(handle.descriptor, "Ljava/lang/invoke/VarHandle;");
    assert!(class.has_utf8("findVarHandle"));
    assert!(class.has_utf8("(Ldemo/Counter;I)I"));
}

#[test]
fn test_ordered_access_needs_java_9() {
    init_logging();
    let mut maker = ClassMaker::with_config("demo/Old", ContainerKind::Class, config(major_versions::JAVA_8));
    let flag = maker.add_field(FieldDef::new("flag", Type::boolean()).modifiers(Modifiers::STATIC)).unwrap();
    maker
        .method(MethodDef::new("read", Type::boolean()).modifiers(Modifiers::STATIC), |code, blk| {
            code.return_value(blk, Expr::field(None, &flag, MemoryOrder::Acquire)?)
        })
        .unwrap();
    let err = maker.finish_to(&mut MemoryOutput::new()).unwrap_err();
    assert!(err.is_invalid_state(), "{err}");
}

#[test]
fn test_lambda_becomes_nested_class() {
    init_logging();
    let mut maker = ClassMaker::new("demo/Host");
    let sam = MethodRef::of_interface("java/util/function/IntSupplier", "getAsInt", vec![], Type::int());
    maker
        .method(
            MethodDef::new("supplier", Type::class("java/util/function/IntSupplier"))
                .modifiers(Modifiers::STATIC)
                .param("base", Type::int()),
            |code, blk| {
                let base = code.param(blk, 0)?;
                let lambda = code.lambda(blk, &sam, |code, body| {
                    let sum = Expr::add(base.get(), Expr::int(1))?;
                    code.return_value(body, sum)
                })?;
                code.return_value(blk, lambda)
            },
        )
        .unwrap();
    let out = finish(&mut maker);
    assert_eq!(out.names(), &["demo.Host$1".to_string(), "demo.Host".to_string()]);

    let host = parse_class(out.get("demo.Host").unwrap());
    assert_eq!(host.nest_members(), ["demo/Host$1"]);
    assert!(host.attribute("InnerClasses").is_some());

    let lambda = parse_class(out.get("demo.Host$1").unwrap());
    assert_eq!(lambda.interfaces, ["java/util/function/IntSupplier"]);
    assert!(lambda.attribute("NestHost").is_some());
    assert!(lambda.attribute("EnclosingMethod").is_some());
    assert_eq!(lambda.field("cap$0").unwrap().descriptor, "I");
    let ctor = lambda.method("<init>").unwrap();
    assert_eq!(ctor.descriptor, "(I)V");
    // aload_0, iload_1, putfield: captures are stored before the superclass constructor runs
    assert_eq!(&ctor.code().unwrap()[..3], &[0x2a, 0x1b, 0xb5]);
    assert_eq!(lambda.method("getAsInt").unwrap().descriptor, "()I");
}

#[test]
fn test_generic_class_signature() {
    init_logging();
    let mut maker = ClassMaker::new("demo/Box");
    maker.type_param(classmaker::TypeParam::new("T")).unwrap();
    let out = finish(&mut maker);
    let class = parse_class(out.get("demo.Box").unwrap());
    let sig = class.attribute("Signature").expect("generic class has a Signature");
    let index = u16::from_be_bytes([sig[0], sig[1]]);
    assert_eq!(class.utf8(index), "<T:Ljava/lang/Object;>Ljava/lang/Object;");
}

#[test]
fn test_directory_output_writes_package_path() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut maker = ClassMaker::new("demo/pkg/Empty");
    maker.default_constructor(Modifiers::PUBLIC).unwrap();
    let mut out = DirectoryOutput::new(dir.path());
    maker.finish_to(&mut out).unwrap();
    let path = dir.path().join("demo").join("pkg").join("Empty.class");
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(parse_class(&bytes).name, "demo/pkg/Empty");
}

#[test]
fn test_finish_twice_is_rejected() {
    init_logging();
    let mut maker = ClassMaker::new("demo/Once");
    finish(&mut maker);
    let err = maker.finish_to(&mut MemoryOutput::new()).unwrap_err();
    assert!(err.is_invalid_state());
}
