use fenris_projection::solve::{
    FormCompilerParameters, KrylovMethod, PreconditionerKind, SolverConfiguration, SolverError, SolverParameters,
};

#[test]
fn configuration_deserializes_from_option_names() {
    let json = r#"{ "ksp_type": "preonly", "pc_type": "cholesky", "ksp_max_it": 25 }"#;
    let configuration: SolverConfiguration = serde_json::from_str(json).unwrap();
    assert_eq!(
        configuration,
        SolverConfiguration::new()
            .with_krylov_method(KrylovMethod::Preonly)
            .with_preconditioner(PreconditionerKind::Cholesky)
            .with_max_iterations(25)
    );
}

#[test]
fn configuration_serializes_only_options_that_are_set() {
    let configuration = SolverConfiguration::new().with_relative_tolerance(1e-10);
    let value = serde_json::to_value(&configuration).unwrap();
    assert_eq!(value, serde_json::json!({ "ksp_rtol": 1e-10 }));

    let roundtrip: SolverConfiguration = serde_json::from_value(value).unwrap();
    assert_eq!(roundtrip, configuration);
}

#[test]
fn configuration_rejects_unknown_options() {
    let result = serde_json::from_str::<SolverConfiguration>(r#"{ "snes_type": "newtonls" }"#);
    assert!(result.is_err());

    let result = serde_json::from_str::<SolverConfiguration>(r#"{ "ksp_type": "gmres" }"#);
    assert!(result.is_err());
}

#[test]
fn merging_keeps_unset_defaults_and_leaves_inputs_untouched() {
    let defaults = SolverParameters::default();
    let configuration = SolverConfiguration::new()
        .with_relative_tolerance(1e-12)
        .with_preconditioner(PreconditionerKind::None);
    let before = configuration.clone();

    let merged = configuration.merged_over(&defaults);
    assert_eq!(merged.krylov_method, KrylovMethod::Cg);
    assert_eq!(merged.relative_tolerance, 1e-12);
    assert_eq!(merged.absolute_tolerance, defaults.absolute_tolerance);
    assert_eq!(merged.max_iterations, defaults.max_iterations);
    assert_eq!(merged.preconditioner, PreconditionerKind::None);

    assert_eq!(configuration, before);
    assert_eq!(defaults, SolverParameters::default());
}

#[test]
fn default_parameters_are_cg_with_tight_relative_tolerance() {
    let defaults = SolverParameters::default();
    assert_eq!(defaults.krylov_method, KrylovMethod::Cg);
    assert_eq!(defaults.relative_tolerance, 1e-8);
    assert!(defaults.validate().is_ok());
}

#[test]
fn configuration_from_pairs() {
    let configuration = SolverConfiguration::from_pairs([
        ("ksp_type", "cg"),
        ("ksp_rtol", "1e-9"),
        ("ksp_max_it", "300"),
        ("pc_type", "jacobi"),
    ])
    .unwrap();
    assert_eq!(configuration.krylov_method, Some(KrylovMethod::Cg));
    assert_eq!(configuration.relative_tolerance, Some(1e-9));
    assert_eq!(configuration.absolute_tolerance, None);
    assert_eq!(configuration.max_iterations, Some(300));
    assert_eq!(configuration.preconditioner, Some(PreconditionerKind::Jacobi));
}

#[test]
fn configuration_from_pairs_rejects_invalid_options() {
    let invalid_key = SolverConfiguration::from_pairs([("ksp_monitor", "true")]);
    assert!(matches!(invalid_key, Err(SolverError::InvalidOption { key, .. }) if key == "ksp_monitor"));

    let invalid_value = SolverConfiguration::from_pairs([("ksp_rtol", "tight")]);
    assert!(matches!(invalid_value, Err(SolverError::InvalidOption { value, .. }) if value == "tight"));

    let invalid_method = SolverConfiguration::from_pairs([("ksp_type", "gmres")]);
    assert!(matches!(invalid_method, Err(SolverError::InvalidOption { key, .. }) if key == "ksp_type"));
}

#[test]
fn preonly_requires_cholesky() {
    let parameters = SolverConfiguration::new()
        .with_krylov_method(KrylovMethod::Preonly)
        .merged_over(&SolverParameters::default());
    assert!(matches!(parameters.validate(), Err(SolverError::UnsupportedConfiguration(_))));

    let parameters = SolverParameters {
        preconditioner: PreconditionerKind::Cholesky,
        ..parameters
    };
    assert!(parameters.validate().is_ok());
}

#[test]
fn negative_tolerances_are_invalid() {
    let parameters = SolverConfiguration::new()
        .with_absolute_tolerance(-1.0)
        .merged_over(&SolverParameters::default());
    assert!(matches!(parameters.validate(), Err(SolverError::InvalidOption { key, .. }) if key == "ksp_atol"));
}

#[test]
fn form_compiler_parameters_roundtrip() {
    let parameters = FormCompilerParameters::with_quadrature_degree(6);
    let json = serde_json::to_string(&parameters).unwrap();
    assert_eq!(serde_json::from_str::<FormCompilerParameters>(&json).unwrap(), parameters);
    assert_eq!(
        serde_json::from_str::<FormCompilerParameters>("{}").unwrap(),
        FormCompilerParameters::default()
    );
}
