//! Integration tests for shader program compilation and uniform handling.

use phobz_scope::gpu::shaders::{FADE_FS, FADE_VS, POINT_FS, POINT_VS};
use phobz_scope::gpu::{
    GpuContext, OffscreenSurface, ProgramError, ShaderLibrary, ShaderProgram, Stage,
};
use phobz_scope::scope::{ScopeError, ScopeRenderer};

async fn create_gpu_context() -> Option<GpuContext> {
    GpuContext::new().await.ok()
}

const UV_FRAGMENT: &str = r#"
@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(uv, 0.0, 1.0);
}
"#;

#[tokio::test]
async fn test_builtin_programs_compile() {
    let Some(ctx) = create_gpu_context().await else {
        return;
    };
    let library = ShaderLibrary::builtin();

    let point = ShaderProgram::compile(
        &ctx,
        &library,
        POINT_VS,
        POINT_FS,
        &["point_color", "point_size", "viewport_size"],
        &[("params", 0)],
        &[],
    )
    .unwrap();
    assert_eq!(point.uniform_block_binding("params"), Some(0));

    let color = point.uniform_location("point_color").unwrap();
    assert_eq!((color.offset, color.size), (0, 12));
    let size = point.uniform_location("point_size").unwrap();
    assert_eq!((size.offset, size.size), (12, 4));

    point.set_uniform("point_color", [1.0, 0.0, 1.0]).unwrap();
    assert!(matches!(
        point.set_uniform("point_size", [1.0, 2.0, 3.0]),
        Err(ProgramError::UniformSize { .. })
    ));
    assert!(matches!(
        point.set_uniform("fade_rate", 0.5),
        Err(ProgramError::UndeclaredUniform(_))
    ));
}

#[tokio::test]
async fn test_undeclared_shader_uniform_is_ignored() {
    let Some(ctx) = create_gpu_context().await else {
        return;
    };
    let program = ShaderProgram::compile(
        &ctx,
        &ShaderLibrary::builtin(),
        POINT_VS,
        POINT_FS,
        &["point_size", "glow_strength"],
        &[],
        &[],
    )
    .unwrap();

    assert!(program.uniform_location("glow_strength").is_none());
    program.set_uniform("glow_strength", 1.0).unwrap();
}

#[tokio::test]
async fn test_compile_error_reports_stage() {
    let Some(ctx) = create_gpu_context().await else {
        return;
    };
    let mut library = ShaderLibrary::builtin();
    library.insert(POINT_FS, "@fragment fn fs_main( -> {");

    let result = ScopeRenderer::init_with_library(ctx, OffscreenSurface::default(), &library);
    match result {
        Err(ScopeError::Program(ProgramError::Compile { stage, id, log })) => {
            assert_eq!(stage, Stage::Fragment);
            assert_eq!(id, POINT_FS);
            assert!(!log.is_empty());
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("broken shader compiled"),
    }
}

#[tokio::test]
async fn test_link_error_on_unmatched_varying() {
    let Some(ctx) = create_gpu_context().await else {
        return;
    };
    let mut library = ShaderLibrary::builtin();
    library.insert("uv-fs", UV_FRAGMENT);

    let err = ShaderProgram::compile(&ctx, &library, POINT_VS, "uv-fs", &[], &[], &[])
        .err()
        .unwrap();
    match err {
        ProgramError::Link { ids, log } => {
            assert!(ids.contains(POINT_VS));
            assert!(log.contains("@location(0)"), "{}", log);
        }
        other => panic!("expected link error, got {}", other),
    }

    // The fade vertex stage does write the uv varying
    ShaderProgram::compile(&ctx, &library, FADE_VS, "uv-fs", &[], &[], &[]).unwrap();
}

#[tokio::test]
async fn test_missing_uniform_block_only_warns() {
    let Some(ctx) = create_gpu_context().await else {
        return;
    };
    let program = ShaderProgram::compile(
        &ctx,
        &ShaderLibrary::builtin(),
        POINT_VS,
        POINT_FS,
        &[],
        &[("params", 0), ("lighting", 3)],
        &[],
    )
    .unwrap();

    assert_eq!(program.uniform_block_binding("params"), Some(0));
    assert_eq!(program.uniform_block_binding("lighting"), None);
}

#[tokio::test]
async fn test_missing_source() {
    let Some(ctx) = create_gpu_context().await else {
        return;
    };
    let mut library = ShaderLibrary::new();
    library.insert(FADE_VS, UV_FRAGMENT);

    let err = ShaderProgram::compile(&ctx, &library, FADE_VS, FADE_FS, &[], &[], &[])
        .err()
        .unwrap();
    assert!(matches!(err, ProgramError::MissingSource(id) if id == FADE_FS));
}
