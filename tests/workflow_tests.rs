//! End-to-end run bookkeeping through the public API

use std::fs;

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use serde_json::{json, Value};
use tempfile::TempDir;

use seq2seq_tune::{
    create_dir, freezing_params, get_last_checkpoint_path, reset_config, use_task_specific_params,
    AdapterArguments, AdapterConfigName, MetricsWriter, ModelArguments, ModelConfig, ModuleKind,
    ParameterRegistry, RunArguments, Seq2SeqModel, TaskRegistry, TrainingArguments,
};

fn adapter_model() -> Result<Seq2SeqModel> {
    let device = Device::Cpu;
    let mut params = ParameterRegistry::new();
    let vb = params.var_builder(DType::F32, &device);

    vb.pp("shared").get_with_hints((16, 8), "weight", candle_nn::init::ZERO)?;
    vb.pp("encoder.block.0.layer.0.SelfAttention.q")
        .get_with_hints((8, 8), "weight", candle_nn::init::ZERO)?;
    vb.pp("encoder.block.0.layer.0.adapter_controller.rte.down")
        .get_with_hints((2, 8), "weight", candle_nn::init::ZERO)?;
    vb.pp("decoder.block.0.layer.0.SelfAttention.q")
        .get_with_hints((8, 8), "weight", candle_nn::init::ZERO)?;
    vb.pp("lm_head").get_with_hints((16, 8), "weight", candle_nn::init::ZERO)?;
    vb.pp("task_embedding_controller.task_to_embeddings")
        .get_with_hints((1, 8), "rte", candle_nn::init::ZERO)?;

    params
        .declare_module("shared", ModuleKind::Embedding)
        .declare_module("encoder", ModuleKind::Encoder)
        .declare_module(
            "encoder.block.0.layer.0.adapter_controller",
            ModuleKind::MetaAdapterController,
        )
        .declare_module("decoder", ModuleKind::Decoder)
        .declare_module("lm_head", ModuleKind::LmHead)
        .declare_module("task_embedding_controller", ModuleKind::TaskEmbeddingController)
        .declare_module(
            "task_embedding_controller.task_to_embeddings",
            ModuleKind::TaskEmbeddings,
        );

    let config = ModelConfig::from_value(json!({"model_type": "t5", "max_length": 128}))?;
    Ok(Seq2SeqModel::new(config, params))
}

#[test]
fn test_meta_adapter_run_trains_only_adapter_parameters() -> Result<()> {
    let mut model = adapter_model()?;
    let training = TrainingArguments {
        train_adapters: true,
        print_num_parameters: true,
        ..Default::default()
    };
    let adapter = AdapterArguments {
        adapter_config_name: AdapterConfigName::MetaAdapter,
        ..Default::default()
    };

    let summary = freezing_params(&mut model, &training, &ModelArguments::default(), &adapter)?;
    assert_eq!(summary.total, 128 + 64 + 16 + 64 + 128 + 8);
    assert_eq!(summary.trainable, 16 + 8);

    // Only trainable vars go to the optimizer, so frozen weights never move.
    let vars = model.params.trainable_vars()?;
    assert_eq!(vars.len(), 2);
    let mut optimizer = AdamW::new(vars.clone(), ParamsAdamW::default())?;
    let loss = vars
        .iter()
        .map(|v| v.as_tensor().sum_all())
        .collect::<candle_core::Result<Vec<Tensor>>>()?;
    let loss = Tensor::stack(&loss, 0)?.sum_all()?;
    optimizer.backward_step(&loss)?;

    let data = model.params.varmap().data().lock().expect("varmap lock");
    let lm_head = data["lm_head.weight"].as_tensor().sum_all()?.to_scalar::<f32>()?;
    assert_eq!(lm_head, 0.0);
    let adapter_sum = data["encoder.block.0.layer.0.adapter_controller.rte.down.weight"]
        .as_tensor()
        .sum_all()?
        .to_scalar::<f32>()?;
    assert!(adapter_sum < 0.0);
    Ok(())
}

#[test]
fn test_run_directory_bookkeeping() -> Result<()> {
    let temp = TempDir::new()?;
    let output_dir = temp.path().join("outputs").join("rte");

    create_dir(&output_dir)?;
    assert_eq!(get_last_checkpoint_path(&output_dir)?, output_dir);

    for step in [200, 400] {
        fs::create_dir(output_dir.join(format!("checkpoint-{}", step)))?;
    }
    assert_eq!(get_last_checkpoint_path(&output_dir)?, output_dir.join("checkpoint-400"));

    let writer = MetricsWriter::new(&output_dir, None);
    let args = RunArguments::default();
    writer.save_json_file(&args.training_args()?, "training_arguments.json")?;
    let metrics = json!({"val_acc": 0.71, "val_loss": 0.64});
    writer.handle_metrics("val", metrics.as_object().expect("object"))?;

    let saved: Value = serde_json::from_str(&fs::read_to_string(output_dir.join("val_results.json"))?)?;
    assert_eq!(saved, metrics);
    let saved_args: Value =
        serde_json::from_str(&fs::read_to_string(output_dir.join("training_arguments.json"))?)?;
    assert!(saved_args.get("evaluation_strategy").is_none());
    assert_eq!(saved_args["model_name_or_path"], json!("t5-base"));
    Ok(())
}

#[test]
fn test_task_params_round_trip_through_evaluation() -> Result<()> {
    let mut registry = TaskRegistry::builtin();
    registry.extend_from_yaml("- name: cnn_dailymail\n  task_specific_config: {max_length: 142, num_beams: 4}\n")?;

    let mut model = adapter_model()?;
    let initial = model.config.clone();
    for task in ["rte", "cnn_dailymail"] {
        use_task_specific_params(&mut model, task, &registry)?;
        reset_config(&mut model, initial.clone());
    }
    assert_eq!(model.config, initial);

    use_task_specific_params(&mut model, "cnn_dailymail", &registry)?;
    assert_eq!(model.config.get_u64("max_length"), Some(142));
    Ok(())
}
