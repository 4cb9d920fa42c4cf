use arch::{FormatVersion, Opcode};
use stasm::{decode, CodeArtifact, Constant, DecodedOperand, Operand, SourcePos, Unit};
use std::thread;

fn program(version: FormatVersion) -> Unit {
    let mut unit = Unit::new(version);
    let top = unit.new_label("top").unwrap();
    let done = unit.new_label("done").unwrap();

    unit.at(SourcePos::new(1, 1));
    unit.push(10).unwrap();
    unit.store_name("n").unwrap();
    unit.bind_label(top).unwrap();
    unit.at(SourcePos::new(2, 5));
    unit.load_name("n").unwrap();
    unit.jump_to(Opcode::PopJumpIfFalse, done).unwrap();
    unit.at(SourcePos::new(3, 5));
    unit.load_name("print").unwrap();
    unit.push_const("tick").unwrap();
    unit.push_const(-1_000_000i64).unwrap();
    unit.call(2).unwrap();
    unit.op(Opcode::Pop).unwrap();
    unit.emit(Opcode::LoadLocal, Operand::Local(3)).unwrap();
    unit.emit(Opcode::StoreLocal, Operand::Local(3)).unwrap();
    unit.load_name("n").unwrap();
    unit.op(Opcode::Dec).unwrap();
    unit.store_name("n").unwrap();
    unit.jump_to(Opcode::Jump, top).unwrap();
    unit.bind_label(done).unwrap();
    unit.at(SourcePos::new(4, 1));
    unit.push_const(true).unwrap();
    unit.op(Opcode::Return).unwrap();
    unit
}

fn expected(unit: &Unit, artifact: &CodeArtifact, operand: &Operand) -> DecodedOperand {
    match operand {
        Operand::Imm(v) => DecodedOperand::Imm(*v),
        Operand::Const(id) => DecodedOperand::Const(id.index()),
        Operand::Name(id) => DecodedOperand::Name(id.index()),
        Operand::Local(v) => DecodedOperand::Local(*v),
        Operand::Count(v) => DecodedOperand::Count(*v),
        Operand::Label(l) => {
            let name = unit.labels().name(*l).unwrap();
            DecodedOperand::Target(artifact.label_offset(name).unwrap())
        }
    }
}

fn assert_round_trip(version: FormatVersion) {
    let unit = program(version);
    let artifact = unit.finalize().unwrap();
    let decoded = decode(artifact.as_bytes()).unwrap();

    assert_eq!(decoded.version, version);
    assert_eq!(decoded.max_stack_depth, artifact.max_stack_depth());
    assert_eq!(decoded.instructions.len(), unit.len());
    for (inst, got) in unit.instructions().iter().zip(&decoded.instructions) {
        assert_eq!(got.opcode, inst.opcode);
        assert_eq!(
            got.operand,
            inst.operand.map(|o| expected(&unit, &artifact, &o))
        );
    }
    assert_eq!(
        decoded.constants,
        unit.constants().iter().cloned().collect::<Vec<_>>()
    );
    assert_eq!(decoded.names, ["n", "print"]);
    assert_eq!(decoded.label("top"), artifact.label_offset("top"));
    assert_eq!(decoded.label("done"), artifact.label_offset("done"));
    assert_eq!(decoded.spans.len(), unit.len());
    assert_eq!(decoded.spans[0], (0, SourcePos::new(1, 1)));
}

macro_rules! round_trip {
    ($($name:ident: $version:expr,)*) => {
        $(
            #[test]
            fn $name() {
                assert_round_trip($version);
            }
        )*
    };
}

round_trip! {
    round_trip_v1: FormatVersion::V1,
    round_trip_v2: FormatVersion::V2,
    round_trip_v3: FormatVersion::V3,
}

#[test]
fn loop_depth() {
    // `print`, "tick" and -1000000 are on the stack right before the call.
    let artifact = program(FormatVersion::V2).finalize().unwrap();
    assert_eq!(artifact.max_stack_depth(), 3);
}

#[test]
fn versions_encode_differently() {
    let v1 = program(FormatVersion::V1).finalize().unwrap();
    let v2 = program(FormatVersion::V2).finalize().unwrap();
    assert_eq!(v1.as_bytes()[0], 1);
    assert_eq!(v2.as_bytes()[0], 2);
    assert_ne!(v1.code(), v2.code());
}

#[test]
fn wide_constants() {
    let mut unit = Unit::new(FormatVersion::V3);
    unit.push(i64::MAX).unwrap();
    unit.push_const(f64::NAN).unwrap();
    unit.push_const(vec![0u8, 1, 2]).unwrap();
    unit.op(Opcode::Halt).unwrap();
    let decoded = unit.finalize().unwrap().decode().unwrap();
    assert_eq!(decoded.instructions[0].operand, Some(DecodedOperand::Imm(i64::MAX)));
    assert_eq!(decoded.constants[0], Constant::Float(f64::NAN));
    assert_eq!(decoded.constants[1], Constant::Bytes(vec![0, 1, 2]));
}

#[test]
fn info_json() {
    let artifact = program(FormatVersion::V2).finalize().unwrap();
    let info = artifact.info();
    assert_eq!(info.size, artifact.as_bytes().len());
    let json = info.to_json().unwrap();
    assert_eq!(stasm::ArtifactInfo::from_json(&json).unwrap(), info);
}

#[test]
fn units_on_separate_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CodeArtifact>();
    assert_send_sync::<Unit>();

    let artifacts: Vec<CodeArtifact> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| program(FormatVersion::V2).finalize().unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for a in &artifacts[1..] {
        assert_eq!(a.as_bytes(), artifacts[0].as_bytes());
    }

    let shared = artifacts[0].clone();
    let len = thread::spawn(move || shared.code().len()).join().unwrap();
    assert_eq!(len, artifacts[0].code().len());
}
