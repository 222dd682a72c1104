//! End-to-end analysis scenarios: sources go in as ASTs, finalized modules
//! come out.

use pretty_assertions::assert_eq;
use stubgen_lua_ast::{Chunk, Expr, Indexer, Parameter, Stmt};
use stubgen_lua_semantic::{AnalysisResult, Analyzer, AnalyzerSettings, ResolvedModule, SourceFile};

fn analyze(files: Vec<(&str, Chunk)>) -> AnalysisResult {
    analyze_with(AnalyzerSettings::default(), files)
}

fn analyze_with(settings: AnalyzerSettings, files: Vec<(&str, Chunk)>) -> AnalysisResult {
    let sources = files
        .into_iter()
        .map(|(path, chunk)| SourceFile::parsed(path, chunk))
        .collect();
    Analyzer::new(settings).analyze(sources)
}

fn single_module(result: &AnalysisResult) -> &ResolvedModule {
    assert_eq!(result.modules.len(), 1, "expected exactly one module");
    &result.modules[0]
}

#[test]
fn derive_call_creates_a_class_with_a_constructor() {
    // Foo = Base:derive("Foo")
    // function Foo:new(x)
    //     local o = Base.new(self)
    //     o.x = x
    //     return o
    // end
    let chunk = Chunk::new(vec![
        Stmt::assign(
            vec![Expr::identifier("Foo")],
            vec![Expr::call(
                Expr::member(Expr::identifier("Base"), Indexer::Colon, "derive"),
                vec![Expr::string("Foo")],
            )],
        ),
        Stmt::function_declaration(
            Expr::member(Expr::identifier("Foo"), Indexer::Colon, "new"),
            vec![Parameter::name("x")],
            vec![
                Stmt::local(
                    vec!["o"],
                    vec![Expr::call(
                        Expr::member(Expr::identifier("Base"), Indexer::Dot, "new"),
                        vec![Expr::identifier("self")],
                    )],
                ),
                Stmt::assign(
                    vec![Expr::member(Expr::identifier("o"), Indexer::Dot, "x")],
                    vec![Expr::identifier("x")],
                ),
                Stmt::ret(vec![Expr::identifier("o")]),
            ],
        ),
    ]);

    let result = analyze(vec![("shared/Foo.lua", chunk)]);
    let module = single_module(&result);

    assert_eq!(module.classes.len(), 1);
    let class = &module.classes[0];
    assert_eq!(class.name, "Foo");
    assert_eq!(class.extends.as_deref(), Some("Base"));
    assert_eq!(class.derive_name.as_deref(), Some("Foo"));

    assert_eq!(class.constructors.len(), 1);
    let constructor = &class.constructors[0];
    assert_eq!(constructor.name, "new");
    assert!(constructor.is_constructor);
    assert_eq!(constructor.parameters.len(), 1);
    assert_eq!(constructor.parameters[0].name, "x");
    assert_eq!(constructor.returns, [vec!["Foo".to_string()]]);

    // `o.x = x` inside the constructor lands as an instance field.
    assert!(class.fields.iter().any(|field| field.name == "x"));
}

#[test]
fn closure_class_from_a_factory_function() {
    // function M.make()
    //     local self = {}
    //     function self:greet() return "hi" end
    //     return self
    // end
    let chunk = Chunk::new(vec![Stmt::function_declaration(
        Expr::member(Expr::identifier("M"), Indexer::Dot, "make"),
        vec![],
        vec![
            Stmt::local(vec!["self"], vec![Expr::table(vec![])]),
            Stmt::function_declaration(
                Expr::member(Expr::identifier("self"), Indexer::Colon, "greet"),
                vec![],
                vec![Stmt::ret(vec![Expr::string("hi")])],
            ),
            Stmt::ret(vec![Expr::identifier("self")]),
        ],
    )]);

    let result = analyze(vec![("shared/M.lua", chunk)]);
    let module = single_module(&result);

    // The captured table becomes a class named after the module.
    assert_eq!(module.classes.len(), 1);
    let class = &module.classes[0];
    assert_eq!(class.name, "M");
    assert!(class.is_local);
    assert_eq!(class.methods.len(), 1);
    assert_eq!(class.methods[0].name, "greet");
    assert_eq!(class.methods[0].returns, [vec!["string".to_string()]]);

    // The factory table would collide with the class name, so it stays a
    // table; its `make` is the constructor returning the class.
    assert_eq!(module.tables.len(), 1);
    let table = &module.tables[0];
    assert_eq!(table.name, "M");
    let make = table
        .functions
        .iter()
        .find(|function| function.name == "make")
        .expect("factory function to be emitted");
    assert!(make.is_constructor);
    assert_eq!(make.returns, [vec!["M".to_string()]]);
}

#[test]
fn setmetatable_binds_an_instance_of_the_class() {
    // A = {}
    // A.__index = A
    // function A:m() end
    // B = setmetatable({}, A)
    let chunk = Chunk::new(vec![
        Stmt::assign(vec![Expr::identifier("A")], vec![Expr::table(vec![])]),
        Stmt::assign(
            vec![Expr::member(Expr::identifier("A"), Indexer::Dot, "__index")],
            vec![Expr::identifier("A")],
        ),
        Stmt::function_declaration(
            Expr::member(Expr::identifier("A"), Indexer::Colon, "m"),
            vec![],
            vec![],
        ),
        Stmt::assign(
            vec![Expr::identifier("B")],
            vec![Expr::call(
                Expr::identifier("setmetatable"),
                vec![Expr::table(vec![]), Expr::identifier("A")],
            )],
        ),
    ]);

    let result = analyze(vec![("shared/A.lua", chunk)]);
    let module = single_module(&result);

    assert_eq!(module.classes.len(), 1);
    let class = &module.classes[0];
    assert_eq!(class.name, "A");
    assert_eq!(class.methods.len(), 1);
    assert_eq!(class.methods[0].name, "m");
    // The metatable wiring itself is not a field.
    assert!(class.static_fields.iter().all(|field| field.name != "__index"));

    let b = module
        .fields
        .iter()
        .find(|field| field.name == "B")
        .expect("B to surface as a module field");
    assert_eq!(b.types, ["A"]);
}

#[test]
fn multi_return_unpacks_by_position() {
    // function f() return 1, "s", nil end
    // a, b, c = f()
    let chunk = Chunk::new(vec![
        Stmt::function_declaration(
            Expr::identifier("f"),
            vec![],
            vec![Stmt::ret(vec![
                Expr::number("1"),
                Expr::string("s"),
                Expr::nil(),
            ])],
        ),
        Stmt::assign(
            vec![
                Expr::identifier("a"),
                Expr::identifier("b"),
                Expr::identifier("c"),
            ],
            vec![Expr::call(Expr::identifier("f"), vec![])],
        ),
    ]);

    let result = analyze(vec![("shared/multi.lua", chunk)]);
    let module = single_module(&result);

    let function = module
        .functions
        .iter()
        .find(|function| function.name == "f")
        .expect("f to be emitted");
    assert_eq!(
        function.returns,
        [
            vec!["number".to_string()],
            vec!["string".to_string()],
            vec!["nil".to_string()],
        ]
    );

    let field = |name: &str| {
        module
            .fields
            .iter()
            .find(|field| field.name == name)
            .unwrap_or_else(|| panic!("field `{name}`"))
    };
    assert_eq!(field("a").types, ["number"]);
    assert_eq!(field("b").types, ["string"]);
    assert!(field("c").nullable);
}

#[test]
fn require_cycles_terminate_and_analyze_both_sides() {
    // u: require("v") ; U = {} ; function U:new() end
    // v: require("u") ; V = {} ; function V:new() end
    let make = |class: &str, requires: &str| {
        Chunk::new(vec![
            Stmt::call(Expr::string_call(Expr::identifier("require"), requires)),
            Stmt::assign(vec![Expr::identifier(class)], vec![Expr::table(vec![])]),
            Stmt::function_declaration(
                Expr::member(Expr::identifier(class), Indexer::Colon, "new"),
                vec![],
                vec![],
            ),
        ])
    };

    let result = analyze(vec![
        ("shared/u.lua", make("U", "v")),
        ("shared/v.lua", make("V", "u")),
    ]);

    let order: Vec<&str> = result.order.iter().map(|name| name.as_str()).collect();
    insta::assert_snapshot!(order.join(", "), @"shared/v, shared/u");

    assert_eq!(result.modules.len(), 2);
    let class_names: Vec<&str> = result
        .modules
        .iter()
        .flat_map(|module| module.classes.iter().map(|class| class.name.as_str()))
        .collect();
    assert!(class_names.contains(&"U"));
    assert!(class_names.contains(&"V"));
}

#[test]
fn dx_dy_heuristic_applies_only_to_the_pair() {
    let chunk = Chunk::new(vec![Stmt::function_declaration(
        Expr::identifier("draw"),
        vec![
            Parameter::name("dx"),
            Parameter::name("dy"),
            Parameter::name("label"),
        ],
        vec![],
    )]);

    let result = analyze(vec![("shared/draw.lua", chunk)]);
    let module = single_module(&result);

    let function = module
        .functions
        .iter()
        .find(|function| function.name == "draw")
        .expect("draw to be emitted");
    assert_eq!(function.parameters[0].types, ["number"]);
    assert_eq!(function.parameters[1].types, ["number"]);
    assert_eq!(function.parameters[2].types, ["unknown"]);
}

#[test]
fn heuristics_can_be_disabled() {
    let chunk = Chunk::new(vec![Stmt::function_declaration(
        Expr::identifier("draw"),
        vec![Parameter::name("dx"), Parameter::name("dy")],
        vec![],
    )]);

    let settings = AnalyzerSettings {
        heuristics: false,
        ..AnalyzerSettings::default()
    };
    let result = analyze_with(settings, vec![("shared/draw.lua", chunk)]);
    let module = single_module(&result);

    let function = &module.functions[0];
    assert_eq!(function.parameters[0].types, ["unknown"]);
    assert_eq!(function.parameters[1].types, ["unknown"]);
}

#[test]
fn self_or_table_keeps_the_established_class() {
    // X = X or {}
    // function X:new() end
    // X = X or {}
    let or_table = || {
        Stmt::assign(
            vec![Expr::identifier("X")],
            vec![Expr::logical(
                stubgen_lua_ast::LogicalOp::Or,
                Expr::identifier("X"),
                Expr::table(vec![]),
            )],
        )
    };
    let chunk = Chunk::new(vec![
        or_table(),
        Stmt::function_declaration(
            Expr::member(Expr::identifier("X"), Indexer::Colon, "new"),
            vec![],
            vec![],
        ),
        or_table(),
    ]);

    let result = analyze(vec![("shared/X.lua", chunk)]);
    let module = single_module(&result);

    assert_eq!(module.classes.len(), 1);
    assert_eq!(module.classes[0].name, "X");
}

#[test]
fn empty_table_reassignment_is_absorbed_into_the_class() {
    // Foo = Base:derive("Foo")
    // Foo = {}
    let chunk = Chunk::new(vec![
        Stmt::assign(
            vec![Expr::identifier("Foo")],
            vec![Expr::call(
                Expr::member(Expr::identifier("Base"), Indexer::Colon, "derive"),
                vec![Expr::string("Foo")],
            )],
        ),
        Stmt::assign(vec![Expr::identifier("Foo")], vec![Expr::table(vec![])]),
    ]);

    let result = analyze(vec![("shared/Foo.lua", chunk)]);
    let module = single_module(&result);

    assert_eq!(module.classes.len(), 1);
    assert_eq!(module.classes[0].name, "Foo");
    assert!(module.tables.is_empty());
}

#[test]
fn unknown_global_placeholder_merges_into_the_real_class() {
    // Widget.helper = function() end   -- Widget is not defined yet
    // Widget = Base:derive("Widget")
    let chunk = Chunk::new(vec![
        Stmt::assign(
            vec![Expr::member(
                Expr::identifier("Widget"),
                Indexer::Dot,
                "helper",
            )],
            vec![Expr::function(vec![], vec![])],
        ),
        Stmt::assign(
            vec![Expr::identifier("Widget")],
            vec![Expr::call(
                Expr::member(Expr::identifier("Base"), Indexer::Colon, "derive"),
                vec![Expr::string("Widget")],
            )],
        ),
    ]);

    let result = analyze(vec![("shared/Widget.lua", chunk)]);
    let module = single_module(&result);

    // One class: the placeholder was folded into the derive class.
    assert_eq!(module.classes.len(), 1);
    let class = &module.classes[0];
    assert_eq!(class.name, "Widget");
    assert!(
        class
            .static_methods
            .iter()
            .any(|function| function.name == "helper"),
        "placeholder definitions should merge into the class"
    );
}

#[test]
fn duplicate_identifiers_drop_the_second_file() {
    let chunk = || Chunk::new(vec![]);
    let result = analyze(vec![
        ("shared/dup.lua", chunk()),
        ("shared/dup.lua", chunk()),
    ]);

    assert_eq!(result.order.len(), 1);
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(
        result.errors[0],
        stubgen_lua_semantic::AnalyzeError::DuplicateIdentifier { .. }
    ));
}

#[test]
fn failed_sources_are_skipped_not_fatal() {
    let good = Chunk::new(vec![Stmt::assign(
        vec![Expr::identifier("Ok")],
        vec![Expr::number("1")],
    )]);
    let result = Analyzer::new(AnalyzerSettings::default()).analyze(vec![
        SourceFile::parsed("shared/good.lua", good),
        SourceFile::failed(
            "shared/bad.lua",
            stubgen_lua_semantic::AnalyzeError::Parse {
                path: "shared/bad.lua".to_string(),
                message: "unexpected symbol".to_string(),
            },
        ),
    ]);

    assert_eq!(result.modules.len(), 1);
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn boolean_literals_collapse_in_finalized_output() {
    // flag = true
    // flag = false
    let chunk = Chunk::new(vec![
        Stmt::assign(vec![Expr::identifier("flag")], vec![Expr::boolean(true)]),
        Stmt::assign(vec![Expr::identifier("flag")], vec![Expr::boolean(false)]),
    ]);

    let result = analyze(vec![("shared/flags.lua", chunk)]);
    let module = single_module(&result);

    let flag = module
        .fields
        .iter()
        .find(|field| field.name == "flag")
        .expect("flag to be emitted");
    assert_eq!(flag.types, ["boolean"]);
}

#[test]
fn min_return_arity_adds_nil_to_optional_positions() {
    // function pick(flag)
    //     if flag then return 1, "extra" end
    //     return 0
    // end
    let chunk = Chunk::new(vec![Stmt::function_declaration(
        Expr::identifier("pick"),
        vec![Parameter::name("flag")],
        vec![
            Stmt::if_stmt(vec![stubgen_lua_ast::IfClause::when(
                Expr::identifier("flag"),
                vec![Stmt::ret(vec![Expr::number("1"), Expr::string("extra")])],
            )]),
            Stmt::ret(vec![Expr::number("0")]),
        ],
    )]);

    let result = analyze(vec![("shared/pick.lua", chunk)]);
    let module = single_module(&result);

    let function = &module.functions[0];
    assert_eq!(function.returns.len(), 2);
    assert_eq!(function.returns[0], ["number"]);
    // The second position is only produced on one path.
    assert!(function.returns[1].contains(&"string".to_string()));
    assert!(function.returns[1].contains(&"nil".to_string()));
}

#[test]
fn atom_ui_factory_calls_create_node_classes() {
    // Node = UI.__call({ _ATOM_UI_CLASS = NodeImpl, init = function(self) end })
    // Button = Node({ press = function(self) end, label = "x" })
    use stubgen_lua_ast::TableField;

    let chunk = Chunk::new(vec![
        Stmt::assign(
            vec![Expr::identifier("Node")],
            vec![Expr::call(
                Expr::member(Expr::identifier("UI"), Indexer::Dot, "__call"),
                vec![Expr::table(vec![
                    TableField::KeyString {
                        key: stubgen_lua_ast::Identifier::new("_ATOM_UI_CLASS"),
                        value: Expr::identifier("NodeImpl"),
                    },
                    TableField::KeyString {
                        key: stubgen_lua_ast::Identifier::new("init"),
                        value: Expr::function(vec![Parameter::name("self")], vec![]),
                    },
                ])],
            )],
        ),
        Stmt::assign(
            vec![Expr::identifier("Button")],
            vec![Expr::call(
                Expr::identifier("Node"),
                vec![Expr::table(vec![
                    TableField::KeyString {
                        key: stubgen_lua_ast::Identifier::new("press"),
                        value: Expr::function(vec![Parameter::name("self")], vec![]),
                    },
                    TableField::KeyString {
                        key: stubgen_lua_ast::Identifier::new("label"),
                        value: Expr::string("x"),
                    },
                ])],
            )],
        ),
    ]);

    let result = analyze(vec![("client/ui/nodes.lua", chunk)]);
    let module = single_module(&result);

    let class = |name: &str| {
        module
            .classes
            .iter()
            .find(|class| class.name == name)
            .unwrap_or_else(|| panic!("class `{name}`"))
    };

    let node = class("Node");
    // A `self`-first function in the argument table is a method.
    assert!(node.methods.iter().any(|method| method.name == "init"));

    let button = class("Button");
    assert_eq!(button.extends.as_deref(), Some("Node"));
    assert!(button.methods.iter().any(|method| method.name == "press"));
    assert!(button
        .static_fields
        .iter()
        .any(|field| field.name == "label" && field.types == ["string"]));
}

#[test]
fn function_in_nested_table_promotes_a_nested_class() {
    // Foo = Base:derive("Foo")
    // Foo.utils = {}
    // function Foo.utils.helper() end
    let chunk = Chunk::new(vec![
        Stmt::assign(
            vec![Expr::identifier("Foo")],
            vec![Expr::call(
                Expr::member(Expr::identifier("Base"), Indexer::Colon, "derive"),
                vec![Expr::string("Foo")],
            )],
        ),
        Stmt::assign(
            vec![Expr::member(Expr::identifier("Foo"), Indexer::Dot, "utils")],
            vec![Expr::table(vec![])],
        ),
        Stmt::function_declaration(
            Expr::member(
                Expr::member(Expr::identifier("Foo"), Indexer::Dot, "utils"),
                Indexer::Dot,
                "helper",
            ),
            vec![],
            vec![],
        ),
    ]);

    let result = analyze(vec![("shared/Foo.lua", chunk)]);
    let module = single_module(&result);

    let names: Vec<&str> = module
        .classes
        .iter()
        .map(|class| class.name.as_str())
        .collect();
    assert!(names.contains(&"Foo"));
    assert!(names.contains(&"Foo.utils"));

    let nested = module
        .classes
        .iter()
        .find(|class| class.name == "Foo.utils")
        .unwrap();
    assert!(nested
        .static_methods
        .iter()
        .any(|function| function.name == "helper"));
}

#[test]
fn local_derive_class_promotes_to_its_global_name() {
    // local Impl = Base:derive("Impl")
    // function Impl:new() end
    // Exported = Impl
    let chunk = Chunk::new(vec![
        Stmt::local(
            vec!["Impl"],
            vec![Expr::call(
                Expr::member(Expr::identifier("Base"), Indexer::Colon, "derive"),
                vec![Expr::string("Impl")],
            )],
        ),
        Stmt::function_declaration(
            Expr::member(Expr::identifier("Impl"), Indexer::Colon, "new"),
            vec![],
            vec![],
        ),
        Stmt::assign(
            vec![Expr::identifier("Exported")],
            vec![Expr::identifier("Impl")],
        ),
    ]);

    let result = analyze(vec![("shared/widgets.lua", chunk)]);
    let module = single_module(&result);

    assert_eq!(module.classes.len(), 1);
    let class = &module.classes[0];
    assert_eq!(class.name, "Exported");
    assert!(!class.is_local);
    assert_eq!(class.constructors.len(), 1);
    assert_eq!(class.constructors[0].returns, [vec!["Exported".to_string()]]);
}

#[test]
fn ternary_idiom_unions_both_branches() {
    // function pick(flag) return flag and "yes" or 0 end
    let chunk = Chunk::new(vec![Stmt::function_declaration(
        Expr::identifier("pick"),
        vec![Parameter::name("flag")],
        vec![Stmt::ret(vec![Expr::logical(
            stubgen_lua_ast::LogicalOp::Or,
            Expr::logical(
                stubgen_lua_ast::LogicalOp::And,
                Expr::identifier("flag"),
                Expr::string("yes"),
            ),
            Expr::number("0"),
        )])],
    )]);

    let result = analyze(vec![("shared/pick.lua", chunk)]);
    let module = single_module(&result);

    let function = &module.functions[0];
    assert_eq!(function.returns, [vec!["string".to_string(), "number".to_string()]]);
}

#[test]
fn intrinsic_calls_have_fixed_return_types() {
    // parsed = tonumber(raw)
    let chunk = Chunk::new(vec![Stmt::assign(
        vec![Expr::identifier("parsed")],
        vec![Expr::call(
            Expr::identifier("tonumber"),
            vec![Expr::identifier("raw")],
        )],
    )]);

    let result = analyze(vec![("shared/convert.lua", chunk)]);
    let module = single_module(&result);

    let parsed = module
        .fields
        .iter()
        .find(|field| field.name == "parsed")
        .expect("parsed to be emitted");
    assert_eq!(parsed.types, ["number"]);
    assert!(parsed.nullable);
}

#[test]
fn require_bindings_resolve_through_module_returns() {
    // a: Config = {}; Config.max = 10; return Config
    // b: local cfg = require("a"); limit = cfg.max
    let provider = Chunk::new(vec![
        Stmt::assign(vec![Expr::identifier("Config")], vec![Expr::table(vec![])]),
        Stmt::assign(
            vec![Expr::member(Expr::identifier("Config"), Indexer::Dot, "max")],
            vec![Expr::number("10")],
        ),
        Stmt::ret(vec![Expr::identifier("Config")]),
    ]);
    let consumer = Chunk::new(vec![
        Stmt::local(
            vec!["cfg"],
            vec![Expr::string_call(Expr::identifier("require"), "a")],
        ),
        Stmt::assign(
            vec![Expr::identifier("limit")],
            vec![Expr::member(Expr::identifier("cfg"), Indexer::Dot, "max")],
        ),
    ]);

    let result = analyze(vec![
        ("shared/a.lua", provider),
        ("shared/b.lua", consumer),
    ]);

    assert_eq!(result.order[0].as_str(), "shared/a");
    let consumer_module = result
        .modules
        .iter()
        .find(|module| module.name.as_ref().is_some_and(|name| name == "shared/b"))
        .expect("consumer module");
    let limit = consumer_module
        .fields
        .iter()
        .find(|field| field.name == "limit")
        .expect("limit to be emitted");
    assert_eq!(limit.types, ["number"]);
}

#[test]
fn usage_narrowing_constrains_parameter_types() {
    // function double(n) return n * 2 end
    let chunk = Chunk::new(vec![Stmt::function_declaration(
        Expr::identifier("double"),
        vec![Parameter::name("n")],
        vec![Stmt::ret(vec![Expr::binary(
            stubgen_lua_ast::BinaryOp::Mul,
            Expr::identifier("n"),
            Expr::number("2"),
        )])],
    )]);

    let result = analyze(vec![("shared/double.lua", chunk)]);
    let module = single_module(&result);

    let function = &module.functions[0];
    assert_eq!(function.returns, [vec!["number".to_string()]]);
}
